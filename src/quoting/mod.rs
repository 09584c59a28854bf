pub mod credit;
pub mod quoter;
pub mod skew;
