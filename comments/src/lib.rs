extern crate abomonation;
#[macro_use]
extern crate abomonation_derive;
extern crate timely;
extern crate serde;
extern crate serde_json;
#[macro_use]
extern crate serde_derive;
extern crate rand;
extern crate zipf;
extern crate chrono;
extern crate rollup;

pub mod config;
pub mod event;
pub mod generator;
pub mod job;
pub mod models;
pub mod sink;

pub mod queries;
