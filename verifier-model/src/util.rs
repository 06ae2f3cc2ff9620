/// Tries converting cesu8-java-style strings into Rust's utf8 strings
/// This tries to avoid allocating but may not be able to avoid it
#[must_use]
pub fn convert_classfile_text(bytes: &[u8]) -> std::borrow::Cow<str> {
    cesu8::from_java_cesu8(bytes).unwrap_or_else(|_| String::from_utf8_lossy(bytes))
}

/// Note: This works fine for a path to a class as well as a package
#[must_use]
pub fn access_path_iter(package: &str) -> impl DoubleEndedIterator<Item = &str> + Clone {
    package.split('/')
}

// We wrap this because the alternative hasher is not generic
// and Rust doesn't allow unused generics.
// But this allows us to have that.
pub(crate) trait HashWrapperTrait<T> {
    type HashMapHasher;
}
pub(crate) struct HashWrapper;
impl<T> HashWrapperTrait<T> for HashWrapper {
    #[cfg(feature = "implementation-cheaper-map-hashing")]
    type HashMapHasher = nohash_hasher::BuildNoHashHasher<T>;
    #[cfg(not(feature = "implementation-cheaper-map-hashing"))]
    type HashMapHasher = std::collections::hash_map::RandomState;
}
