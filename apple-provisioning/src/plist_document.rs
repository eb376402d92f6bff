// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Property list documents with typed key access.

Provisioning profiles and entitlements are XML property lists whose root is
a dictionary. [PropertyListDocument] owns such a root dictionary and exposes
accessors that distinguish between a key that is absent and a key holding a
value of the wrong type.
*/

use {
    crate::error::ProvisioningError,
    plist::{Dictionary, Value},
};

/// An owned property list whose root value is a dictionary.
///
/// Dictionary keys are unique and keep their insertion order. Array element
/// order is preserved.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyListDocument {
    root: Dictionary,
}

impl From<Dictionary> for PropertyListDocument {
    fn from(root: Dictionary) -> Self {
        Self { root }
    }
}

impl PropertyListDocument {
    /// Parse an XML property list document.
    ///
    /// The root element must be a `<dict>`.
    pub fn from_xml_str(text: &str) -> Result<Self, ProvisioningError> {
        let value = Value::from_reader_xml(text.as_bytes())?;

        Self::from_value(value)
    }

    /// Construct an instance from a parsed [Value].
    pub fn from_value(value: Value) -> Result<Self, ProvisioningError> {
        value
            .into_dictionary()
            .map(Self::from)
            .ok_or(ProvisioningError::PropertyListNotDictionary)
    }

    /// Obtain the raw value of a key.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// Obtain a string value.
    pub fn get_string(&self, key: &str) -> Result<Option<&str>, ProvisioningError> {
        match self.get_value(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(type_error(key, "string")),
        }
    }

    /// Obtain a boolean value.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ProvisioningError> {
        match self.get_value(key) {
            None => Ok(None),
            Some(Value::Boolean(v)) => Ok(Some(*v)),
            Some(_) => Err(type_error(key, "boolean")),
        }
    }

    /// Obtain an array of strings.
    ///
    /// Errors if the key is not an array or if any element is not a string.
    pub fn get_string_array(&self, key: &str) -> Result<Option<Vec<String>>, ProvisioningError> {
        self.get_array_with(key, "array of strings", |v| {
            v.as_string().map(|s| s.to_string())
        })
    }

    /// Obtain an array of `<data>` values.
    ///
    /// The XML representation is base64; returned values are the decoded bytes.
    pub fn get_data_array(&self, key: &str) -> Result<Option<Vec<Vec<u8>>>, ProvisioningError> {
        self.get_array_with(key, "array of data", |v| v.as_data().map(|d| d.to_vec()))
    }

    /// Obtain a nested dictionary.
    pub fn get_dictionary(&self, key: &str) -> Result<Option<&Dictionary>, ProvisioningError> {
        match self.get_value(key) {
            None => Ok(None),
            Some(Value::Dictionary(d)) => Ok(Some(d)),
            Some(_) => Err(type_error(key, "dictionary")),
        }
    }

    /// Clone the dictionary stored under `key` into a new document.
    ///
    /// The returned document shares nothing with this one.
    pub fn clone_dictionary_rooted_at(
        &self,
        key: &str,
    ) -> Result<Option<PropertyListDocument>, ProvisioningError> {
        Ok(self.get_dictionary(key)?.cloned().map(Self::from))
    }

    /// Set a key to an arbitrary value, returning the previous value.
    pub fn set_value(&mut self, key: impl ToString, value: Value) -> Option<Value> {
        self.root.insert(key.to_string(), value)
    }

    /// Set a key to a string value.
    pub fn set_string(&mut self, key: impl ToString, value: impl ToString) -> Option<Value> {
        self.set_value(key, Value::String(value.to_string()))
    }

    /// Set a key to an array of strings.
    pub fn set_string_array(
        &mut self,
        key: impl ToString,
        values: impl IntoIterator<Item = String>,
    ) -> Option<Value> {
        self.set_value(
            key,
            Value::Array(values.into_iter().map(Value::String).collect()),
        )
    }

    /// Serialize to a standalone XML property list document.
    ///
    /// Output includes the XML declaration, DOCTYPE and `<plist>` wrapper.
    pub fn to_xml_string(&self) -> Result<String, ProvisioningError> {
        let mut buffer = Vec::new();
        Value::Dictionary(self.root.clone()).to_writer_xml(&mut buffer)?;

        // The plist writer only emits UTF-8.
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn get_array_with<T>(
        &self,
        key: &str,
        expected: &'static str,
        convert: impl Fn(&Value) -> Option<T>,
    ) -> Result<Option<Vec<T>>, ProvisioningError> {
        match self.get_value(key) {
            None => Ok(None),
            Some(Value::Array(values)) => values
                .iter()
                .map(|v| convert(v).ok_or_else(|| type_error(key, expected)))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(type_error(key, expected)),
        }
    }
}

fn type_error(key: &str, expected: &'static str) -> ProvisioningError {
    ProvisioningError::PropertyListKeyType {
        key: key.to_string(),
        expected,
    }
}
