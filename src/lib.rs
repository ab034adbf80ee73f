#![allow(clippy::enum_variant_names)]

//! File-level local history: records structural changes to a virtual file
//! tree as a log of change sets and reverts any recorded change together
//! with every later change that depends on it.
//!
//! ```no_run
//! use localhist::history::LocalHistory;
//!
//! let mut history = LocalHistory::default();
//! history.create_directory("src").unwrap();
//! let create = history.create_file("src/lib.rs", "pub fn f() {}").unwrap();
//! history.change_file_content("src/lib.rs", "pub fn g() {}").unwrap();
//!
//! let chain = history.log().get_chain(create).unwrap();
//! assert_eq!(chain.len(), 2);
//! ```

pub mod changes;
pub mod config;
pub mod ext;
pub mod gateway;
pub mod history;
pub mod log;
pub mod revert;
pub mod storage;
pub mod tree;
pub mod visitor;
