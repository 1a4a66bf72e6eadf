//! Scenario tests for witness resolution
//!
//! Each file builds a small declaration registry and drives the engine end to end.

mod test_specificity;
