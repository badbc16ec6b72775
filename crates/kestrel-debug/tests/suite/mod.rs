mod breakpoints;
mod evaluator;
mod gate;
mod session;
mod support;
