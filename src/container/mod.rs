use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

mod error;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerName`].
const CONTAINER_NAME_MAX_LEN: usize = 255;

/// Separator the runtime prepends to reported container names.
const NAME_SEPARATOR: char = '/';

/// Labels attached to a container, shared between the container record and every metric
/// derived from it.
pub type Labels = Arc<HashMap<String, String>>;

/// A validated, canonical container name.
///
/// The canonical form is the name as reported by the runtime with its leading `/` stripped,
/// e.g. `/web-1` becomes `web-1`.
///
/// # Examples
///
/// ```
/// # use creo_poller::container::ContainerName;
/// let name = ContainerName::canonical("/web-1").unwrap();
/// assert_eq!(name.as_ref(), "web-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerName(Arc<str>);

impl ContainerName {
    /// Creates a new `ContainerName` from an already canonical name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerName`] if the name is empty, longer than
    /// [`CONTAINER_NAME_MAX_LEN`], or still carries the leading separator.
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty()
            || src.len() > CONTAINER_NAME_MAX_LEN
            || src.starts_with(NAME_SEPARATOR)
        {
            return Err(Error::InvalidContainerName(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Derives the canonical name from a raw reported name by stripping its leading separator.
    pub fn canonical(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        Self::new(raw.strip_prefix(NAME_SEPARATOR).unwrap_or(raw))
    }
}

impl AsRef<str> for ContainerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for ContainerName {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A running container known to the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    name: ContainerName,
    names: Vec<String>,
    labels: Labels,
}

impl Container {
    pub fn new(name: ContainerName, names: Vec<String>, labels: HashMap<String, String>) -> Self {
        Self {
            name,
            names,
            labels: Arc::new(labels),
        }
    }

    /// Builds a container from the names reported by the runtime, using the first one as the
    /// canonical name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingName`] if `names` is empty, or
    /// [`Error::InvalidContainerName`] if the first name is not a valid name.
    pub fn from_reported(names: Vec<String>, labels: HashMap<String, String>) -> Result<Self> {
        let first = names.first().ok_or(Error::MissingName)?;
        let name = ContainerName::canonical(first)?;

        Ok(Self::new(name, names, labels))
    }

    /// The canonical name.
    pub fn name(&self) -> &ContainerName {
        &self.name
    }

    /// The names exactly as reported by the runtime.
    pub fn names(&self) -> &[String] {
        self.names.as_slice()
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }
}
