//! Small value types shared by the `DroidJar` crates.

pub mod leb;
