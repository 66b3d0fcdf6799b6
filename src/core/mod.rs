// Core modules: loader handle, entry-point registry, argument marshaling, and errors.
pub mod error;
pub mod handle;
pub mod marshal;
pub mod registry;
