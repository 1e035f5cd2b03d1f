pub mod cli;
pub mod sync;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;
