mod console_tests;
mod state_tests;
