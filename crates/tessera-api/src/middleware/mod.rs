//! HTTP middleware shared by the route groups
//!
//! Author: hephaex@gmail.com

pub mod rate_limit;
