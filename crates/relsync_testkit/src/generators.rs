//! Property-based test generators using proptest.
//!
//! Provides strategies for generating values and rows that fit the staff
//! schema of [`fixtures`](crate::fixtures).

use crate::fixtures::{EMPLOYEE, MANAGER};
use proptest::prelude::*;
use relsync_codec::{Decimal, Value};

/// Strategy for generating names that fit a `String(100)` column.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 ]{0,39}").expect("Invalid regex")
}

/// Strategy for generating microsecond timestamps.
pub fn timestamp_strategy() -> impl Strategy<Value = i64> {
    0i64..4_000_000_000_000_000
}

/// Strategy for generating whole-unit decimals.
pub fn salary_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(Decimal::from)
}

/// Strategy for generating scalar values of any kind.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        timestamp_strategy().prop_map(Value::Timestamp),
        name_strategy().prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes),
    ]
}

/// Field values of one employee.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeValues {
    /// Primary key.
    pub id: i64,
    /// Name.
    pub name: String,
    /// Item type.
    pub kind: i64,
    /// Salary, possibly unset.
    pub salary: Option<Decimal>,
    /// Stamp.
    pub updated: i64,
}

impl EmployeeValues {
    /// Values in `EMPLOYEE_COLUMNS` order, with no department.
    pub fn to_row(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::from(self.name.as_str()),
            Value::Integer(self.kind),
            Value::Null,
            self.salary.map_or(Value::Null, Value::Decimal),
            Value::Timestamp(self.updated),
        ]
    }
}

/// Strategy for generating employees of either item type.
pub fn employee_strategy() -> impl Strategy<Value = EmployeeValues> {
    (
        1i64..1_000_000,
        name_strategy(),
        prop_oneof![Just(EMPLOYEE), Just(MANAGER)],
        prop::option::of(salary_strategy()),
        timestamp_strategy(),
    )
        .prop_map(|(id, name, kind, salary, updated)| EmployeeValues {
            id,
            name,
            kind,
            salary,
            updated,
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn names_fit_their_column(name in name_strategy()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.len() <= 40);
        }

        #[test]
        fn employee_rows_match_cursor_shape(employee in employee_strategy()) {
            let row = employee.to_row();
            prop_assert_eq!(row.len(), crate::fixtures::EMPLOYEE_COLUMNS.len());
            prop_assert_eq!(&row[0], &Value::Integer(employee.id));
            prop_assert!(row[3].is_null());
        }
    }
}
