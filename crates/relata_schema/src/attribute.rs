//! Attribute declarations.

/// A declared attribute of a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDef {
    /// Externally visible attribute name.
    pub name: String,
    /// Format hint for serializers (`"default"` unless declared).
    pub format: String,
    /// Row column read and written instead of `name`.
    pub delegate: Option<String>,
}

impl AttributeDef {
    /// An attribute stored in the column of the same name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: "default".to_string(),
            delegate: None,
        }
    }

    /// Sets the format hint.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Stores the attribute in another column.
    #[must_use]
    pub fn delegate_to(mut self, column: impl Into<String>) -> Self {
        self.delegate = Some(column.into());
        self
    }

    /// The row column backing this attribute.
    #[must_use]
    pub fn column(&self) -> &str {
        self.delegate.as_deref().unwrap_or(&self.name)
    }
}
