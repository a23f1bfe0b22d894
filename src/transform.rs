pub mod categorical;
pub mod date;
pub mod one_hot;
pub mod timeseries;
pub mod vectorize;
