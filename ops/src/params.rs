use std::collections::BTreeMap;
use std::fmt;

use crate::types::OpError;

/// Kind of value a parameter field holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Float,
    Int,
    Bool,
    Str,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Float => f.write_str("float"),
            ParamKind::Int => f.write_str("int"),
            ParamKind::Bool => f.write_str("bool"),
            ParamKind::Str => f.write_str("string"),
        }
    }
}

/// A typed parameter value
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(String),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Str(_) => ParamKind::Str,
        }
    }

    fn parse(kind: ParamKind, raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        match kind {
            ParamKind::Float => raw
                .parse::<f64>()
                .map(ParamValue::Float)
                .map_err(|e| format!("`{raw}` is not a float: {e}")),
            ParamKind::Int => raw
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|e| format!("`{raw}` is not an integer: {e}")),
            ParamKind::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(ParamValue::Bool(true)),
                "false" | "0" => Ok(ParamValue::Bool(false)),
                _ => Err(format!("`{raw}` is not a boolean")),
            },
            ParamKind::Str => Ok(ParamValue::Str(raw.to_string())),
        }
    }
}

/// Declaration of one named parameter an operator accepts
#[derive(Clone, Debug, PartialEq)]
pub struct ParamField {
    pub name:    &'static str,
    pub kind:    ParamKind,
    pub default: Option<ParamValue>,
    pub doc:     &'static str,
}

impl ParamField {
    pub fn float(name: &'static str, default: Option<f64>, doc: &'static str) -> Self {
        Self { name, kind: ParamKind::Float, default: default.map(ParamValue::Float), doc }
    }

    pub fn int(name: &'static str, default: Option<i64>, doc: &'static str) -> Self {
        Self { name, kind: ParamKind::Int, default: default.map(ParamValue::Int), doc }
    }

    pub fn boolean(name: &'static str, default: Option<bool>, doc: &'static str) -> Self {
        Self { name, kind: ParamKind::Bool, default: default.map(ParamValue::Bool), doc }
    }

    pub fn string(name: &'static str, default: Option<&str>, doc: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Str,
            default: default.map(|s| ParamValue::Str(s.to_string())),
            doc,
        }
    }
}

/// Typed configuration of one operator instance.
///
/// Built once from a string map when the node is created; every declared
/// field is present afterwards (explicitly set or defaulted).
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ParameterBlock {
    owner:  String,
    values: BTreeMap<&'static str, ParamValue>,
}

impl ParameterBlock {
    /// Parse `config` against the declared `fields` of operator `owner`.
    pub fn parse<I, K, V>(owner: &str, fields: &[ParamField], config: I) -> Result<Self, OpError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let invalid = |field: &str, reason: String| OpError::InvalidParameter {
            op: owner.to_string(),
            field: field.to_string(),
            reason,
        };

        let mut values = BTreeMap::new();
        for (key, raw) in config {
            let key = key.as_ref();
            let field = fields
                .iter()
                .find(|f| f.name == key)
                .ok_or_else(|| invalid(key, "no such parameter".to_string()))?;
            let value = ParamValue::parse(field.kind, raw.as_ref()).map_err(|r| invalid(key, r))?;
            values.insert(field.name, value);
        }

        for field in fields {
            if values.contains_key(field.name) {
                continue;
            }
            match &field.default {
                Some(default) => {
                    values.insert(field.name, default.clone());
                }
                None => return Err(invalid(field.name, "required parameter is missing".to_string())),
            }
        }

        Ok(Self { owner: owner.to_string(), values })
    }

    /// The operator this block was parsed for
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The same values, attributed to another operator (backward nodes).
    pub fn reowned(&self, owner: &str) -> Self {
        Self { owner: owner.to_string(), values: self.values.clone() }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    pub fn float(&self, name: &str) -> Result<f64, OpError> {
        match self.lookup(name)? {
            ParamValue::Float(v) => Ok(*v),
            other => Err(self.wrong_kind(name, ParamKind::Float, other)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, OpError> {
        match self.lookup(name)? {
            ParamValue::Int(v) => Ok(*v),
            other => Err(self.wrong_kind(name, ParamKind::Int, other)),
        }
    }

    pub fn boolean(&self, name: &str) -> Result<bool, OpError> {
        match self.lookup(name)? {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(self.wrong_kind(name, ParamKind::Bool, other)),
        }
    }

    pub fn string(&self, name: &str) -> Result<&str, OpError> {
        match self.lookup(name)? {
            ParamValue::Str(v) => Ok(v),
            other => Err(self.wrong_kind(name, ParamKind::Str, other)),
        }
    }

    fn lookup(&self, name: &str) -> Result<&ParamValue, OpError> {
        self.values.get(name).ok_or_else(|| OpError::InvalidParameter {
            op: self.owner.clone(),
            field: name.to_string(),
            reason: "not declared by this operator".to_string(),
        })
    }

    fn wrong_kind(&self, name: &str, wanted: ParamKind, found: &ParamValue) -> OpError {
        OpError::InvalidParameter {
            op: self.owner.clone(),
            field: name.to_string(),
            reason: format!("holds a {}, not a {wanted}", found.kind()),
        }
    }
}
