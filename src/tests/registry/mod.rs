//! Registry tests.

mod dispatch_tests;
