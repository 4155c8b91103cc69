//! Integration tests for the admission flow, duty arbitration and event routing

mod admission_flow;
mod arbitration;
mod registry_persistence;
mod support;
