pub mod board;
pub mod records;
pub mod tally;
