pub mod cesaro;
pub mod fitting;
pub mod grid;
pub mod moments;
pub mod pairtype;
