//! The polymorphic value model: a tagged union over the five supported
//! container types, each with its own compact/large dual encoding.

pub mod hash;
pub mod list;
pub mod set;
pub mod string;
pub mod zset;

pub use hash::HashValue;
pub use list::ListValue;
pub use set::SetValue;
pub use string::StringValue;
pub use zset::ZSetValue;

use crate::error::{RedisError, Result};

/// Every value stored under a key.
#[derive(Debug, Clone)]
pub enum Value {
    String(StringValue),
    List(ListValue),
    Set(SetValue),
    ZSet(ZSetValue),
    Hash(HashValue),
}

impl Value {
    /// The `TYPE` command's reply string.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::ZSet(_) => "zset",
            Self::Hash(_) => "hash",
        }
    }

    /// The `OBJECT ENCODING` reply string.
    pub fn encoding(&self) -> &'static str {
        match self {
            Self::String(v) => v.encoding(),
            Self::List(v) => v.encoding(),
            Self::Set(v) => v.encoding(),
            Self::ZSet(v) => v.encoding(),
            Self::Hash(v) => v.encoding(),
        }
    }

    pub fn as_string(&self) -> Result<&StringValue> {
        match self {
            Self::String(v) => Ok(v),
            _ => Err(RedisError::wrong_type()),
        }
    }

    pub fn as_string_mut(&mut self) -> Result<&mut StringValue> {
        match self {
            Self::String(v) => Ok(v),
            _ => Err(RedisError::wrong_type()),
        }
    }

    pub fn as_list(&self) -> Result<&ListValue> {
        match self {
            Self::List(v) => Ok(v),
            _ => Err(RedisError::wrong_type()),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut ListValue> {
        match self {
            Self::List(v) => Ok(v),
            _ => Err(RedisError::wrong_type()),
        }
    }

    pub fn as_set(&self) -> Result<&SetValue> {
        match self {
            Self::Set(v) => Ok(v),
            _ => Err(RedisError::wrong_type()),
        }
    }

    pub fn as_set_mut(&mut self) -> Result<&mut SetValue> {
        match self {
            Self::Set(v) => Ok(v),
            _ => Err(RedisError::wrong_type()),
        }
    }

    pub fn as_zset(&self) -> Result<&ZSetValue> {
        match self {
            Self::ZSet(v) => Ok(v),
            _ => Err(RedisError::wrong_type()),
        }
    }

    pub fn as_zset_mut(&mut self) -> Result<&mut ZSetValue> {
        match self {
            Self::ZSet(v) => Ok(v),
            _ => Err(RedisError::wrong_type()),
        }
    }

    pub fn as_hash(&self) -> Result<&HashValue> {
        match self {
            Self::Hash(v) => Ok(v),
            _ => Err(RedisError::wrong_type()),
        }
    }

    pub fn as_hash_mut(&mut self) -> Result<&mut HashValue> {
        match self {
            Self::Hash(v) => Ok(v),
            _ => Err(RedisError::wrong_type()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn type_names() {
        assert_eq!(Value::String(StringValue::Int(1)).type_name(), "string");
        assert_eq!(Value::List(ListValue::new()).type_name(), "list");
        assert_eq!(Value::Set(SetValue::new()).type_name(), "set");
        assert_eq!(Value::ZSet(ZSetValue::new()).type_name(), "zset");
        assert_eq!(Value::Hash(HashValue::new()).type_name(), "hash");
    }

    #[test]
    fn wrong_type_access() {
        let v = Value::String(StringValue::from_bytes(Bytes::from_static(b"x")));
        assert!(v.as_list().is_err());
        assert!(v.as_set().is_err());
        assert!(v.as_zset().is_err());
        assert!(v.as_hash().is_err());
        assert!(v.as_string().is_ok());
    }
}
