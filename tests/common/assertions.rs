//! Custom assertion macros

/// Assert that a result is ok and return the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert that exactly one event in a slice matches a pattern
#[macro_export]
macro_rules! assert_single_event {
    ($events:expr, $($pattern:tt)+) => {{
        let count = $events.iter().filter(|event| matches!(event, $($pattern)+)).count();
        assert_eq!(count, 1, "expected exactly one matching event in {:#?}", $events);
    }};
}
