//! Quantities entering a zero-field-splitting calculation.

pub mod orbital;
pub mod tensor;
