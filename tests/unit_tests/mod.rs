mod action;
mod sampler;
