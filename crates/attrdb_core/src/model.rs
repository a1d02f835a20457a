//! Model instances and their persisted representation.

use crate::error::{CoreError, CoreResult};
use crate::types::InstanceId;
use crate::value::AttributeValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A persistent model instance: a stable identifier plus named attribute
/// values.
///
/// Instances are owned by the store; they are created and destroyed via
/// [`crate::store::ModelStore::create`] and [`crate::store::ModelStore::delete`].
/// The persisted form is canonical CBOR of this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInstance {
    /// Stable identifier, assigned at creation.
    id: InstanceId,
    /// Current attribute values by name. Attributes declared on the
    /// schema but never set are absent here and read as `None`.
    attributes: BTreeMap<String, AttributeValue>,
}

impl ModelInstance {
    /// Creates a new instance with no attribute values set.
    #[must_use]
    pub fn new(id: InstanceId) -> Self {
        Self {
            id,
            attributes: BTreeMap::new(),
        }
    }

    /// Returns the instance identifier.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Returns the current value of an attribute.
    ///
    /// Unset attributes read as [`AttributeValue::None`].
    #[must_use]
    pub fn get(&self, attribute: &str) -> &AttributeValue {
        self.attributes
            .get(attribute)
            .unwrap_or(&AttributeValue::None)
    }

    /// Sets an attribute value, returning the previous one.
    pub fn set(&mut self, attribute: impl Into<String>, value: AttributeValue) -> AttributeValue {
        let attribute = attribute.into();
        if value.is_none() {
            return self
                .attributes
                .remove(&attribute)
                .unwrap_or(AttributeValue::None);
        }
        self.attributes
            .insert(attribute, value)
            .unwrap_or(AttributeValue::None)
    }

    /// Iterates over the attribute values that are set.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Encodes the instance to its persisted CBOR form.
    ///
    /// # Errors
    ///
    /// Fails if serialization fails.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(CoreError::codec)?;
        Ok(buf)
    }

    /// Decodes an instance from its persisted CBOR form.
    ///
    /// # Errors
    ///
    /// Fails if the bytes are not a valid encoded instance.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(bytes).map_err(CoreError::codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_attribute_reads_as_none() {
        let instance = ModelInstance::new(InstanceId::new());
        assert!(instance.get("name").is_none());
    }

    #[test]
    fn set_and_get() {
        let mut instance = ModelInstance::new(InstanceId::new());
        let old = instance.set("name", "George Abitbol".into());
        assert!(old.is_none());
        assert_eq!(instance.get("name").as_text(), Some("George Abitbol"));
    }

    #[test]
    fn set_returns_previous_value() {
        let mut instance = ModelInstance::new(InstanceId::new());
        instance.set("age", AttributeValue::Int(30));
        let old = instance.set("age", AttributeValue::Int(31));
        assert_eq!(old, AttributeValue::Int(30));
    }

    #[test]
    fn setting_none_unsets() {
        let mut instance = ModelInstance::new(InstanceId::new());
        instance.set("name", "Peter".into());
        instance.set("name", AttributeValue::None);
        assert!(instance.get("name").is_none());
        assert_eq!(instance.attributes().count(), 0);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut instance = ModelInstance::new(InstanceId::new());
        instance.set("name", "George Abitbol".into());
        instance.set("age", AttributeValue::Int(50));

        let bytes = instance.encode().unwrap();
        let decoded = ModelInstance::decode(&bytes).unwrap();
        assert_eq!(instance, decoded);
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(ModelInstance::decode(&[0xff, 0x00, 0x01]).is_err());
    }
}
