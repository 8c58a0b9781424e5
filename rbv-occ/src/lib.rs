mod version;

pub use version::{
    insert_count, is_deleted, is_locked, is_writing, validate, OccVersion, DELETED, INSERTCNT_UNIT,
    INSERT, LOCK, SPLIT, WRITING,
};
