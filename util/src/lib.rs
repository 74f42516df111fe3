use std::path::PathBuf;

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Path of an output file of a test, `data/unit_tests/<test_name>/<file_name>`.
///
/// The parent directory is created if it does not exist.
pub fn test_output_path(test_name: &str, file_name: &str) -> PathBuf {
    let dir = PathBuf::from("data/unit_tests").join(test_name);
    std::fs::create_dir_all(&dir).expect("Failed to create test output directory");
    dir.join(file_name)
}
