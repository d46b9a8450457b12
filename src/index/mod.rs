pub mod bucket_page;
pub mod codec;
pub mod directory_page;
pub mod extendible_hash_table;

pub use bucket_page::{bucket_capacity, BucketPage, BucketPageRef};
pub use codec::{FixedCodec, KeyComparator, OrdComparator};
pub use directory_page::{DirectoryPage, DirectoryPageRef};
pub use extendible_hash_table::ExtendibleHashTable;
