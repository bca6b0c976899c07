use std::fmt::{Display, Write};

/// One step in a [`FieldPath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    /// A field, addressed by its wire name.
    Field(String),

    /// An element of a list.
    Index(usize),

    /// An entry of a free-form object or map.
    Key(String),
}

/// Location of a value inside a document, rendered the way the Kubernetes API reports
/// field paths, e.g. `spec.worker.volumes[0].hostPath`.
///
/// Paths are built from wire names so they line up with what the API server and
/// `kubectl explain` show.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// A path starting at the top-level field `name`.
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![PathSegment::Field(name.into())])
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        self.with(PathSegment::Field(name.into()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.with(PathSegment::Index(index))
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        self.with(PathSegment::Key(key.into()))
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    fn with(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }
}

impl<'a> FromIterator<&'a str> for FieldPath {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|name| PathSegment::Field(name.to_owned()))
                .collect(),
        )
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }

        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Field(name) => {
                    if i > 0 {
                        f.write_char('.')?;
                    }
                    f.write_str(name)?;
                }
                PathSegment::Index(index) => write!(f, "[{index}]")?,
                PathSegment::Key(key) => write!(f, "[{key}]")?,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_like_kubernetes() {
        let path = FieldPath::root("spec")
            .child("worker")
            .child("volumes")
            .index(0)
            .child("hostPath");

        assert_eq!(path.to_string(), "spec.worker.volumes[0].hostPath");
    }

    #[test]
    fn display_map_keys() {
        let path = FieldPath::from_iter(["spec", "worker", "resources", "requests"]).key("cpu");

        assert_eq!(path.to_string(), "spec.worker.resources.requests[cpu]");
    }

    #[test]
    fn display_root() {
        assert_eq!(FieldPath::new().to_string(), "<root>");
        assert_eq!(FieldPath::new().index(2).to_string(), "[2]");
    }
}
