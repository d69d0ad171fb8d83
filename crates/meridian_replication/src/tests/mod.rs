//! Scenario tests that exercise several components together.

mod bootstrap;
mod persistence;
mod support;
