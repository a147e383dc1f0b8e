use std::slice;

/// Value found in the results of an MI record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// C-string constant (already unescaped).
    Const(String),

    /// Tuple of named values (`{a="1",b="2"}`).
    Tuple(Tuple),

    /// List of unnamed values (`["r0","r1"]` or `[{...},{...}]`).
    List(Vec<Value>),

    /// List of named values (`[frame={...},frame={...}]`).
    ResultList(Tuple),
}

impl Value {
    /// Returns the inner string if this value is a constant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Const(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the inner tuple if this value is a tuple.
    pub const fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Self::Tuple(t) => Some(t),
            _ => None,
        }
    }

    /// Iterates over the elements of a list, ignoring the names of a result
    /// list.
    ///
    /// Constants and tuples yield no element.
    pub fn items(&self) -> Items<'_> {
        match self {
            Self::List(values) => Items::Values(values.iter()),
            Self::ResultList(results) => Items::Results(results.0.iter()),
            Self::Const(_) | Self::Tuple(_) => Items::Values((&[] as &[Value]).iter()),
        }
    }
}

/// Iterator over the elements of a [Value] list.
pub enum Items<'a> {
    #[doc(hidden)]
    Values(slice::Iter<'a, Value>),
    #[doc(hidden)]
    Results(slice::Iter<'a, (String, Value)>),
}

impl<'a> Iterator for Items<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Values(it) => it.next(),
            Self::Results(it) => it.next().map(|(_, v)| v),
        }
    }
}

/// Ordered collection of named values.
///
/// Names are not unique in MI output (e.g., `body=[bkpt={..},bkpt={..}]`),
/// so lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tuple(pub Vec<(String, Value)>);

impl Tuple {
    /// Returns the first value with the given name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns the first constant with the given name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Follows a path of nested tuples and returns the constant at its end.
    pub fn get_path(&self, path: &[&str]) -> Option<&str> {
        let (last, parents) = path.split_last()?;

        parents
            .iter()
            .try_fold(self, |tuple, name| tuple.get(name).and_then(Value::as_tuple))
            .and_then(|tuple| tuple.get_str(last))
    }

    /// Iterates over the named values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Returns the number of named values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether there is no named value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<(String, Value)>> for Tuple {
    fn from(results: Vec<(String, Value)>) -> Self {
        Self(results)
    }
}
