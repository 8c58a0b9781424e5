/// One logical step of a workload. Both replicas run the identical
/// sequence of these; workload generation (Zipf key selection, value
/// synthesis, rate limiting) is the external collaborator spec.md §1 names
/// and is not this crate's concern — this is just the stream shape both
/// sides consume.
#[derive(Debug, Clone)]
pub enum Operation {
    Insert(Vec<u8>, Vec<u8>),
    Get(Vec<u8>),
    DeleteKey(Vec<u8>),
}
