use crate::error::TypesError;
use serde::{Deserialize, Serialize};

/// Iteration order of a storage range scan.
///
/// Contracts pass the order as an integer: 1 is ascending, 2 is descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    Ascending = 1,
    Descending = 2,
}

impl TryFrom<i32> for Order {
    type Error = TypesError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Order::Ascending),
            2 => Ok(Order::Descending),
            other => Err(TypesError::InvalidOrder(other)),
        }
    }
}

impl From<Order> for i32 {
    fn from(order: Order) -> i32 {
        order as i32
    }
}

/// A key/value pair returned by a storage iterator.
pub type Record = (Vec<u8>, Vec<u8>);
