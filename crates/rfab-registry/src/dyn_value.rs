use std::sync::Mutex;

use rfab_wire::Value;

use crate::{error::RegistryError, remote_value::RemoteValue};

/// The `RemoteValue` a plain `List`/`Map`/scalar `Value` is registered as —
/// the built-in-container analogue of `processional`'s wrapped Python
/// `list`/`dict` objects (spec.md §8 scenario 4: `wrap(lambda: [1,2,3])`
/// followed by `h.append(5)`).
pub struct DynValue(Mutex<Value>);

impl DynValue {
    pub fn new(value: Value) -> Self {
        Self(Mutex::new(value))
    }
}

impl RemoteValue for DynValue {
    fn get_item(&self, key: &Value) -> Result<Value, RegistryError> {
        let guard = self.0.lock().unwrap();
        index_value(&guard, key)
    }

    fn set_item(&self, key: &Value, value: Value) -> Result<(), RegistryError> {
        let mut guard = self.0.lock().unwrap();
        match (&mut *guard, key) {
            (Value::List(items), Value::Int(i)) => {
                let idx = normalize_index(*i, items.len())?;
                items[idx] = value;
                Ok(())
            }
            (Value::Map(entries), key) => {
                if let Some(slot) = entries.iter_mut().find(|(k, _)| k == key) {
                    slot.1 = value;
                } else {
                    entries.push((key.clone(), value));
                }
                Ok(())
            }
            _ => Err(RegistryError::BadAddress("value does not support item assignment".into())),
        }
    }

    fn del_item(&self, key: &Value) -> Result<(), RegistryError> {
        let mut guard = self.0.lock().unwrap();
        match (&mut *guard, key) {
            (Value::List(items), Value::Int(i)) => {
                let idx = normalize_index(*i, items.len())?;
                items.remove(idx);
                Ok(())
            }
            (Value::Map(entries), key) => {
                let before = entries.len();
                entries.retain(|(k, _)| k != key);
                if entries.len() == before {
                    Err(RegistryError::BadAddress(format!("key {key:?} not found")))
                } else {
                    Ok(())
                }
            }
            _ => Err(RegistryError::BadAddress("value does not support item deletion".into())),
        }
    }

    fn call_method(&self, name: &str, mut args: Vec<Value>) -> Result<Value, RegistryError> {
        let mut guard = self.0.lock().unwrap();
        match (&mut *guard, name) {
            (Value::List(items), "append") if args.len() == 1 => {
                items.push(args.remove(0));
                Ok(Value::Null)
            }
            (Value::List(items), "__len__") => Ok(Value::Int(items.len() as i64)),
            (Value::Map(entries), "__len__") => Ok(Value::Int(entries.len() as i64)),
            (Value::Map(entries), "keys") => {
                Ok(Value::List(entries.iter().map(|(k, _)| k.clone()).collect()))
            }
            _ => Err(RegistryError::BadAddress(format!("no method {name}"))),
        }
    }

    fn snapshot(&self) -> Result<Value, RegistryError> {
        Ok(self.0.lock().unwrap().clone())
    }
}

/// Resolves one `Item`/`Attr` step against a plain `Value` (spec.md §3's
/// container-indexing case of address resolution); used both by
/// `DynValue::get_item` and by `Registry::dereference` when walking the
/// address tail past the registered root.
pub fn index_value(value: &Value, key: &Value) -> Result<Value, RegistryError> {
    match (value, key) {
        (Value::List(items), Value::Int(i)) => {
            let idx = normalize_index(*i, items.len())?;
            items.get(idx).cloned().ok_or_else(|| out_of_range(*i))
        }
        (Value::Map(entries), key) => entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| RegistryError::BadAddress(format!("key {key:?} not found"))),
        _ => Err(RegistryError::BadAddress("value is not indexable".into())),
    }
}

fn normalize_index(i: i64, len: usize) -> Result<usize, RegistryError> {
    let idx = if i < 0 { i + len as i64 } else { i };
    if idx < 0 || idx as usize >= len { Err(out_of_range(i)) } else { Ok(idx as usize) }
}

fn out_of_range(i: i64) -> RegistryError {
    RegistryError::BadAddress(format!("index {i} out of range"))
}
