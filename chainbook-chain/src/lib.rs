pub mod evm;
pub mod tron;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;
