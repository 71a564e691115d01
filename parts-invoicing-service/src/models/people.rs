//! Customers and employees, as far as invoicing needs them.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub customer_id: i64,
    pub first_name: String,
    pub last_name: String,
}

impl Customer {
    pub fn full_name(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub employee_id: i64,
    pub first_name: String,
    pub last_name: String,
}

impl Employee {
    pub fn full_name(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }
}

fn full_name(first: &str, last: &str) -> String {
    format!("{} {}", first.trim(), last.trim()).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_joins_and_trims() {
        let customer = Customer {
            customer_id: 5,
            first_name: " Ada ".to_string(),
            last_name: "Lovelace".to_string(),
        };
        assert_eq!(customer.full_name(), "Ada Lovelace");

        let employee = Employee {
            employee_id: 1,
            first_name: "Cher".to_string(),
            last_name: String::new(),
        };
        assert_eq!(employee.full_name(), "Cher");
    }
}
