//! Runtime-indexed arrays and per-element records.
//!
//! An [`Array`] is a fixed, ordered list of items: expressions (constants or
//! signals), nested arrays, or [`Record`]s of named fields. Indexing it with a
//! runtime expression yields an [`ArrayProxy`], which can be indexed again
//! (`array[a][b]`) or narrowed to a record field (`array[a].p`) before being
//! lowered to a plain [`Expr::Index`] for reading or [`Target::Index`] for
//! writing.

use crate::error::FragmentError;
use crate::expr::Expr;
use crate::ids::SignalId;
use crate::target::Target;
use tessera_common::Value;

/// One element of an [`Array`].
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// A value; assignable when the expression names storage.
    Value(Expr),
    /// A nested array.
    Array(Array),
    /// A record of named fields.
    Record(Record),
    /// A deferred selection from another array.
    Proxy(Box<ArrayProxy>),
}

impl Item {
    fn index(self, index: &Expr) -> Result<Item, FragmentError> {
        match self {
            Item::Array(array) => Ok(Item::Proxy(Box::new(array.index(index.clone())))),
            Item::Proxy(proxy) => Ok(Item::Proxy(Box::new(proxy.index(index.clone())?))),
            Item::Value(_) => Err(FragmentError::NotIndexable(
                "cannot index into a value".into(),
            )),
            Item::Record(_) => Err(FragmentError::NotIndexable(
                "cannot index into a record".into(),
            )),
        }
    }

    fn field(self, name: &str) -> Result<Item, FragmentError> {
        match self {
            Item::Record(record) => record
                .field(name)
                .cloned()
                .ok_or_else(|| FragmentError::UnknownField(name.to_string())),
            Item::Proxy(proxy) => Ok(Item::Proxy(Box::new(proxy.field(name)?))),
            Item::Value(_) | Item::Array(_) => Err(FragmentError::NotIndexable(format!(
                "cannot access field '{name}' of a non-record"
            ))),
        }
    }

    fn into_expr(self) -> Result<Expr, FragmentError> {
        match self {
            Item::Value(expr) => Ok(expr),
            Item::Record(record) => Ok(Expr::Cat(
                record
                    .fields
                    .into_iter()
                    .map(|(_, item)| item.into_expr())
                    .collect::<Result<_, _>>()?,
            )),
            Item::Proxy(proxy) => proxy.into_expr(),
            Item::Array(_) => Err(FragmentError::NotIndexable(
                "an array cannot be used as a value".into(),
            )),
        }
    }

    fn into_target(self) -> Result<Target, FragmentError> {
        match self {
            Item::Value(expr) => Target::try_from(expr),
            Item::Record(record) => Ok(Target::Cat(
                record
                    .fields
                    .into_iter()
                    .map(|(_, item)| item.into_target())
                    .collect::<Result<_, _>>()?,
            )),
            Item::Proxy(proxy) => proxy.into_target(),
            Item::Array(_) => Err(FragmentError::NotIndexable(
                "an array cannot be assigned as a whole".into(),
            )),
        }
    }
}

impl From<Expr> for Item {
    fn from(expr: Expr) -> Self {
        Item::Value(expr)
    }
}

impl From<SignalId> for Item {
    fn from(id: SignalId) -> Self {
        Item::Value(Expr::Signal(id))
    }
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        Item::Value(Expr::Const(value))
    }
}

impl From<i64> for Item {
    fn from(value: i64) -> Self {
        Item::Value(Expr::constant(value))
    }
}

impl From<Array> for Item {
    fn from(array: Array) -> Self {
        Item::Array(array)
    }
}

impl From<Record> for Item {
    fn from(record: Record) -> Self {
        Item::Record(record)
    }
}

/// Named fields; as a value, the fields concatenate in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, Item)>,
}

impl Record {
    /// A record with the given fields, first field least significant.
    pub fn new<N: Into<String>, I: Into<Item>>(fields: impl IntoIterator<Item = (N, I)>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, item)| (name.into(), item.into()))
                .collect(),
        }
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&Item> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, item)| item)
    }
}

/// A fixed-size, ordered collection of items.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    items: Vec<Item>,
}

impl Array {
    /// An array of the given items.
    pub fn new<I: Into<Item>>(items: impl IntoIterator<Item = I>) -> Self {
        Self {
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the array has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Selects an item at runtime.
    pub fn index(&self, index: impl Into<Expr>) -> ArrayProxy {
        ArrayProxy {
            elements: self.items.clone(),
            index: index.into(),
        }
    }
}

/// The result of indexing an [`Array`] with a runtime expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayProxy {
    elements: Vec<Item>,
    index: Expr,
}

impl ArrayProxy {
    /// Indexes every candidate element again (`array[a][b]`).
    pub fn index(self, index: impl Into<Expr>) -> Result<ArrayProxy, FragmentError> {
        let index = index.into();
        Ok(ArrayProxy {
            elements: self
                .elements
                .into_iter()
                .map(|item| item.index(&index))
                .collect::<Result<_, _>>()?,
            index: self.index,
        })
    }

    /// Narrows every candidate record to one field (`array[a].p`).
    pub fn field(self, name: &str) -> Result<ArrayProxy, FragmentError> {
        Ok(ArrayProxy {
            elements: self
                .elements
                .into_iter()
                .map(|item| item.field(name))
                .collect::<Result<_, _>>()?,
            index: self.index,
        })
    }

    /// Lowers the selection to an expression.
    pub fn into_expr(self) -> Result<Expr, FragmentError> {
        if self.elements.is_empty() {
            return Err(FragmentError::EmptyArray);
        }
        Ok(Expr::Index {
            elements: self
                .elements
                .into_iter()
                .map(Item::into_expr)
                .collect::<Result<_, _>>()?,
            index: Box::new(self.index),
        })
    }

    /// Lowers the selection to an assignment target.
    pub fn into_target(self) -> Result<Target, FragmentError> {
        if self.elements.is_empty() {
            return Err(FragmentError::EmptyArray);
        }
        Ok(Target::Index {
            elements: self
                .elements
                .into_iter()
                .map(Item::into_target)
                .collect::<Result<_, _>>()?,
            index: self.index,
        })
    }
}
