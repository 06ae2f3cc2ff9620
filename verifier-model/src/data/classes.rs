use std::collections::HashMap;

use crate::{data::class_names::ClassNames, id::ClassId};

/// The class-hierarchy lookup the object-type merger delegates to (`SPEC_FULL.md` §4.6,
/// `getRAMClass`). Kept as a trait rather than a concrete type because loading/linking a class
/// record from a class loader is explicitly an external collaborator outside the core's scope;
/// the core only needs "what is the superclass of this id" and "does this id implement that
/// interface".
pub trait ClassHierarchy {
    /// The direct superclass of `class_id`, or `None` if `class_id` is `java/lang/Object` (which
    /// has none) or an interface (whose superclass is irrelevant to the merge).
    ///
    /// `Err` models the two failure reasons `SPEC_FULL.md` §4.6 calls out for `getRAMClass`:
    /// the class could not be found (internal error) or the lookup ran out of memory.
    fn super_class_of(
        &self,
        class_names: &ClassNames,
        class_id: ClassId,
    ) -> Result<Option<ClassId>, ClassLookupError>;

    fn implements_interface(
        &self,
        class_names: &ClassNames,
        class_id: ClassId,
        interface_id: ClassId,
    ) -> Result<bool, ClassLookupError>;

    fn is_interface(&self, class_names: &ClassNames, class_id: ClassId) -> Result<bool, ClassLookupError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassLookupError {
    NotFound(ClassId),
    OutOfMemory,
}

#[derive(Debug, Clone, Default)]
pub struct ClassRecord {
    pub super_class: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub is_interface: bool,
}

/// A minimal in-memory class-hierarchy store, standing in for the real class loader. Grounded on
/// `rhojvm-base`'s `Classes::is_super_class` / `Classes::implements_interface`, but with the
/// class-file-loading machinery those used (`ClassFiles`, `Packages`) stripped out: records are
/// inserted directly rather than paged in from a loader, which is the shape the core actually
/// needs and the shape tests construct fixtures with.
#[derive(Debug, Default)]
pub struct Classes {
    records: HashMap<ClassId, ClassRecord>,
}
impl Classes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class_id: ClassId, record: ClassRecord) {
        self.records.insert(class_id, record);
    }

    #[must_use]
    pub fn get(&self, class_id: ClassId) -> Option<&ClassRecord> {
        self.records.get(&class_id)
    }
}
impl ClassHierarchy for Classes {
    fn super_class_of(
        &self,
        _class_names: &ClassNames,
        class_id: ClassId,
    ) -> Result<Option<ClassId>, ClassLookupError> {
        if class_id == 0 {
            // java/lang/Object has no superclass; the chain terminates here.
            return Ok(None);
        }

        self.records
            .get(&class_id)
            .map(|record| record.super_class)
            .ok_or(ClassLookupError::NotFound(class_id))
    }

    fn implements_interface(
        &self,
        class_names: &ClassNames,
        class_id: ClassId,
        interface_id: ClassId,
    ) -> Result<bool, ClassLookupError> {
        let mut current = Some(class_id);
        while let Some(id) = current {
            let record = self.records.get(&id).ok_or(ClassLookupError::NotFound(id))?;
            for &direct in &record.interfaces {
                if direct == interface_id {
                    return Ok(true);
                }
                if self.implements_interface(class_names, direct, interface_id)? {
                    return Ok(true);
                }
            }

            current = self.super_class_of(class_names, id)?;
        }

        Ok(false)
    }

    fn is_interface(&self, _class_names: &ClassNames, class_id: ClassId) -> Result<bool, ClassLookupError> {
        self.records
            .get(&class_id)
            .map(|record| record.is_interface)
            .ok_or(ClassLookupError::NotFound(class_id))
    }
}

/// `isSuperClass`/`is_super_class`: walks `class_id`'s superclass chain looking for
/// `maybe_super_class_id`. Equal ids are never considered a super/sub relationship.
pub fn is_super_class(
    hierarchy: &impl ClassHierarchy,
    class_names: &ClassNames,
    class_id: ClassId,
    maybe_super_class_id: ClassId,
) -> Result<bool, ClassLookupError> {
    if class_id == maybe_super_class_id {
        return Ok(false);
    }

    let mut current = Some(class_id);
    while let Some(id) = current {
        let super_id = hierarchy.super_class_of(class_names, id)?;
        if super_id == Some(maybe_super_class_id) {
            return Ok(true);
        }
        current = super_id;
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (ClassNames, Classes) {
        let mut names = ClassNames::new();
        let mut classes = Classes::new();
        classes.insert(names.object_id(), ClassRecord::default());
        classes.insert(
            names.throwable_id(),
            ClassRecord {
                super_class: Some(names.object_id()),
                ..ClassRecord::default()
            },
        );
        let runtime_exception = names.gcid_from_bytes(b"java/lang/RuntimeException");
        classes.insert(
            runtime_exception,
            ClassRecord {
                super_class: Some(names.throwable_id()),
                ..ClassRecord::default()
            },
        );
        (names, classes)
    }

    #[test]
    fn walks_superclass_chain() {
        let (names, classes) = fixture();
        let runtime_exception = names.gcid_from_bytes(b"java/lang/RuntimeException");
        assert!(is_super_class(&classes, &names, runtime_exception, names.object_id()).unwrap());
        assert!(is_super_class(&classes, &names, runtime_exception, names.throwable_id()).unwrap());
        assert!(!is_super_class(&classes, &names, names.object_id(), runtime_exception).unwrap());
    }

    #[test]
    fn equal_ids_are_not_super_of_themselves() {
        let (names, classes) = fixture();
        assert!(!is_super_class(&classes, &names, names.object_id(), names.object_id()).unwrap());
    }

    #[test]
    fn interface_walk_recurses_through_extended_interfaces() {
        let (mut names, mut classes) = fixture();
        let runnable = names.gcid_from_bytes(b"java/lang/Runnable");
        let sub_runnable = names.gcid_from_bytes(b"test/SubRunnable");
        classes.insert(runnable, ClassRecord::default());
        classes.insert(
            sub_runnable,
            ClassRecord {
                interfaces: vec![runnable],
                ..ClassRecord::default()
            },
        );
        let user = names.gcid_from_bytes(b"test/User");
        classes.insert(
            user,
            ClassRecord {
                super_class: Some(names.object_id()),
                interfaces: vec![sub_runnable],
                ..ClassRecord::default()
            },
        );

        assert!(classes.implements_interface(&names, user, runnable).unwrap());
    }
}
