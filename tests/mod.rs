mod support;

mod breaker_tests;
