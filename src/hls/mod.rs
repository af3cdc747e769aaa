pub mod detect;
pub mod rewrite;
