//! FitSense outfit analysis client
//!
//! This library submits outfit photos to the FitSense analysis service and
//! drives each resulting job to completion by bounded polling. It also reads
//! the digital wardrobe the service builds from those analyses.

pub mod config;
pub mod models;
pub mod services;
