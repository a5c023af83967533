//! Timetable engine: assigns subjects to classrooms and periods across
//! school weeks without double-booking, honouring teacher availability and
//! subject hour budgets.

pub mod availability;
pub mod config;
pub mod data;
pub mod error;
pub mod hours;
pub mod report;
pub mod scheduler;
pub mod server;
pub mod store;
