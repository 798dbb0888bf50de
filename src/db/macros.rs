//! Parameter list macro.

/// Build a `Vec<SqlValue>` of positional statement parameters.
///
/// Each argument is converted with `SqlValue::from`, so plain Rust values,
/// `Option`s (which become NULL) and byte vectors can be mixed freely.
///
/// # Example
///
/// ```ignore
/// let params = params!["uuid-1", "Alice", 100, None::<i64>];
/// db.update("INSERT INTO players VALUES (?, ?, ?, ?)", params);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::models::SqlValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::models::SqlValue::from($value)),+]
    };
}
