//! # class-scanner
//!
//! A parallel classpath scanner: finds classes, resources and modules on
//! the Java classpath, parses matched classfiles, and answers queries over
//! the result (subclasses, interface implementors, annotated classes).
//!
//! ## Architecture
//!
//! - **scan**: Scan sessions, classpath entry parsing, the two-stage
//!   parallel pipeline, and the query surface over the results
//! - **matcher**: Whitelist/blacklist matching for packages, classfile
//!   paths and jar names
//! - **element**: Classpath element variants (directory, jar, module) and
//!   the resources they yield
//! - **classfile**: Binary classfile parser producing `ClassInfo`
//! - **reader**: Buffered byte-level reader over classfile streams
//! - **signature**: Recursive-descent parser for generic type signatures
//! - **class_info**: Parsed class, field, method and annotation metadata
//! - **recycler**: Pooled jar handles shared between scanner threads
//! - **queue**: Work queue driving the parallel scan stages

pub mod class_info;
pub mod classfile;
pub mod element;
pub mod matcher;
pub mod queue;
pub mod reader;
pub mod recycler;
pub mod scan;
pub mod signature;
