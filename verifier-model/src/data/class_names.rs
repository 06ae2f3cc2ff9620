use std::hash::{Hash, Hasher};

use indexmap::{Equivalent, IndexMap};

use crate::{id::ClassId, util};

/// Ground truth: OpenJ9's verifier reserves `classNameList` index 0 for `java/lang/Object`
/// (`bcverify.c`, `bcvCreateVerifierState`). This interner additionally reserves index 1 for
/// `java/lang/Throwable`, since the simulator needs it whenever an `exceptionClassIndex` of 0
/// is substituted for an exception handler's declared catch type.
const OBJECT_NAME: &[u8] = b"java/lang/Object";
const THROWABLE_NAME: &[u8] = b"java/lang/Throwable";

// TODO: Should this be a smallvec? Most class names are well under 64 bytes.
#[derive(Clone)]
pub struct RawClassName(pub Vec<u8>);
impl RawClassName {
    #[must_use]
    pub fn get(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn as_slice(&self) -> RawClassNameSlice<'_> {
        RawClassNameSlice(self.0.as_slice())
    }
}
impl Eq for RawClassName {}
impl PartialEq for RawClassName {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Hash for RawClassName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state)
    }
}
impl std::fmt::Debug for RawClassName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "\"{}\"",
            util::convert_classfile_text(&self.0)
        ))
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct RawClassNameSlice<'a>(&'a [u8]);
impl<'a> RawClassNameSlice<'a> {
    #[must_use]
    pub fn get(&self) -> &'a [u8] {
        self.0
    }

    #[must_use]
    pub fn to_owned(&self) -> RawClassName {
        RawClassName(self.0.to_owned())
    }
}
impl<'a> Equivalent<RawClassName> for RawClassNameSlice<'a> {
    fn equivalent(&self, key: &RawClassName) -> bool {
        self.0 == key.0
    }
}
impl<'a> Hash for RawClassNameSlice<'a> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for piece in self.0 {
            piece.hash(state);
        }
    }
}
impl<'a> std::fmt::Debug for RawClassNameSlice<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("\"{}\"", util::convert_classfile_text(self.0)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClassNameInfo {
    id: ClassId,
    is_array: bool,
}
impl ClassNameInfo {
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.is_array
    }
}

/// Append-only interner mapping observed reference type names to small indices, consulted
/// whenever a reference value flows into the lattice (`SPEC_FULL.md` §4.2).
///
/// Grounded on `rhojvm-base`'s `ClassNames`, trimmed of everything downstream of class loading
/// (array-descriptor construction, per-level array ids): the core only ever needs to go from
/// bytes to an id and back, never to synthesize new array class names from parts.
#[derive(Debug)]
pub struct ClassNames {
    next_id: u64,
    names: IndexMap<RawClassName, ClassNameInfo>,
}
impl ClassNames {
    #[must_use]
    pub fn new() -> Self {
        let mut class_names = ClassNames {
            next_id: 0,
            names: IndexMap::with_capacity(32),
        };

        let object_id = class_names.gcid_from_bytes(OBJECT_NAME);
        debug_assert_eq!(object_id, 0);
        let throwable_id = class_names.gcid_from_bytes(THROWABLE_NAME);
        debug_assert_eq!(throwable_id, 1);

        class_names
    }

    fn get_new_id(&mut self) -> ClassId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Id of `java/lang/Object`. Always 0.
    #[must_use]
    pub fn object_id(&self) -> ClassId {
        0
    }

    /// Id of `java/lang/Throwable`. Always 1.
    #[must_use]
    pub fn throwable_id(&self) -> ClassId {
        1
    }

    #[must_use]
    pub fn is_array(&self, id: ClassId) -> bool {
        self.name_from_gcid(id).map_or(false, |(_, info)| info.is_array())
    }

    #[must_use]
    pub fn name_from_gcid(&self, id: ClassId) -> Option<(RawClassNameSlice<'_>, &ClassNameInfo)> {
        // TODO: This linear scan is fine for the handful of classes a single method's
        // verification ever touches, but would need an id -> index side table for a
        // high-class-count embedding.
        self.names
            .iter()
            .find(|(_, info)| info.id == id)
            .map(|(data, info)| (data.as_slice(), info))
    }

    /// `findClassName` from `SPEC_FULL.md` §4.2: interns `class_path` (slash-separated, no
    /// leading `L`/trailing `;`), returning its existing index or appending a new one.
    pub fn gcid_from_bytes(&mut self, class_path: &[u8]) -> ClassId {
        let class_path = RawClassNameSlice(class_path);
        if let Some(entry) = self.names.get(&class_path) {
            return entry.id;
        }

        let is_array = crate::id::is_array_class_bytes(class_path.get());
        let id = self.get_new_id();
        self.names
            .insert(class_path.to_owned(), ClassNameInfo { id, is_array });
        id
    }

    pub fn gcid_from_slice<T: AsRef<str>>(&mut self, class_path: &[T]) -> ClassId {
        let joined = class_path
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("/");
        self.gcid_from_bytes(joined.as_bytes())
    }

    pub fn gcid_from_str(&mut self, class_path: &str) -> ClassId {
        self.gcid_from_bytes(class_path.as_bytes())
    }

    /// Human-readable name for logging. Never fails; falls back to placeholder text for a
    /// `ClassId` that was never interned, which should only happen if a caller fabricates one.
    #[must_use]
    pub fn tpath(&self, id: ClassId) -> std::borrow::Cow<'_, str> {
        match self.name_from_gcid(id) {
            Some((name, _)) => util::convert_classfile_text(name.get()),
            None => std::borrow::Cow::Borrowed("[UNKNOWN CLASS NAME]"),
        }
    }
}

impl Default for ClassNames {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_and_throwable_are_reserved() {
        let names = ClassNames::new();
        assert_eq!(names.object_id(), 0);
        assert_eq!(names.throwable_id(), 1);
        assert_eq!(names.tpath(0), "java/lang/Object");
        assert_eq!(names.tpath(1), "java/lang/Throwable");
    }

    #[test]
    fn interning_is_stable_and_append_only() {
        let mut names = ClassNames::new();
        let a = names.gcid_from_bytes(b"java/lang/String");
        let b = names.gcid_from_bytes(b"java/lang/String");
        assert_eq!(a, b);
        assert_eq!(a, 2);

        let c = names.gcid_from_slice(&["java", "util", "List"]);
        assert_eq!(c, 3);
    }

    #[test]
    fn array_classes_are_flagged() {
        let mut names = ClassNames::new();
        let id = names.gcid_from_bytes(b"[Ljava/lang/String;");
        assert!(names.is_array(id));
        let id = names.gcid_from_bytes(b"java/lang/String");
        assert!(!names.is_array(id));
    }
}
