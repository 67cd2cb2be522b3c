pub mod deck;
pub mod demo;
