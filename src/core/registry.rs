// Eager resolution of the fixed engine entry-point table into typed callables.
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::fmt;
use std::marker::PhantomData;
use std::os::raw::c_char;

use tracing::{debug, trace, warn};

use crate::core::error::{Error, ErrorKind};

pub type ExtractFn = unsafe extern "C" fn(*const c_char, *const c_char);
pub type QueryFn = unsafe extern "C" fn(*const c_char);
/// The engine returns `size_t`; it is read as the same-width signed integer so that
/// out-of-domain values show up as negative instead of as huge counts.
pub type CountFn = unsafe extern "C" fn(*const c_char) -> isize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Operation {
    ExtractJp2,
    ExtractDes,
    GetVersion,
    NumImages,
    NumGraphics,
    NumTextFiles,
    NumDes,
    NumRes,
}

impl Operation {
    /// Resolution order; also the index order of `EntryPoints`.
    pub const ALL: [Operation; 8] = [
        Operation::ExtractJp2,
        Operation::ExtractDes,
        Operation::GetVersion,
        Operation::NumImages,
        Operation::NumGraphics,
        Operation::NumTextFiles,
        Operation::NumDes,
        Operation::NumRes,
    ];

    pub fn symbol(self) -> &'static CStr {
        match self {
            Operation::ExtractJp2 => c"extract_jp2",
            Operation::ExtractDes => c"extract_des",
            Operation::GetVersion => c"get_version",
            Operation::NumImages => c"get_num_images_from_file",
            Operation::NumGraphics => c"get_num_graphics_from_file",
            Operation::NumTextFiles => c"get_num_text_files_from_file",
            Operation::NumDes => c"get_num_des_from_file",
            Operation::NumRes => c"get_num_res_from_file",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::ExtractJp2 => "extract_jp2",
            Operation::ExtractDes => "extract_des",
            Operation::GetVersion => "get_version",
            Operation::NumImages => "get_num_images_from_file",
            Operation::NumGraphics => "get_num_graphics_from_file",
            Operation::NumTextFiles => "get_num_text_files_from_file",
            Operation::NumDes => "get_num_des_from_file",
            Operation::NumRes => "get_num_res_from_file",
        }
    }

    pub fn signature(self) -> Signature {
        match self {
            Operation::ExtractJp2 | Operation::ExtractDes => Signature::PathsToUnit,
            Operation::GetVersion => Signature::PathToUnit,
            Operation::NumImages
            | Operation::NumGraphics
            | Operation::NumTextFiles
            | Operation::NumDes
            | Operation::NumRes => Signature::PathToCount,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Signature {
    /// (input path, output path) -> void
    PathsToUnit,
    /// (input path) -> void
    PathToUnit,
    /// (input path) -> count
    PathToCount,
}

/// Anything that can map an exported name to an address.
pub trait SymbolSource {
    /// Returns the address of `name`, or `None` when it is not exported.
    /// Implementations never return a null address.
    fn lookup(&self, name: &CStr) -> Option<*const ()>;
}

/// Explicit name-to-address map, for engines linked into the calling binary.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    entries: HashMap<CString, *const ()>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &CStr, address: *const ()) -> Self {
        self.insert(name, address);
        self
    }

    /// Null addresses are ignored so the table never reports a null symbol.
    pub fn insert(&mut self, name: &CStr, address: *const ()) {
        if address.is_null() {
            return;
        }
        self.entries.insert(name.to_owned(), address);
    }

    pub fn remove(&mut self, name: &CStr) -> Option<*const ()> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SymbolSource for SymbolTable {
    fn lookup(&self, name: &CStr) -> Option<*const ()> {
        self.entries.get(name).copied()
    }
}

#[derive(Clone, Copy)]
enum Callable {
    Extract(ExtractFn),
    Query(QueryFn),
    Count(CountFn),
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Extract(func) => write!(f, "Extract({:p})", *func as *const ()),
            Callable::Query(func) => write!(f, "Query({:p})", *func as *const ()),
            Callable::Count(func) => write!(f, "Count({:p})", *func as *const ()),
        }
    }
}

/// One bound export, valid only while the source it was resolved from is alive.
#[derive(Clone, Copy, Debug)]
pub struct EntryPoint<'src> {
    operation: Operation,
    callable: Callable,
    _source: PhantomData<&'src ()>,
}

impl EntryPoint<'_> {
    /// Binds `address` through the signature declared for `operation`.
    ///
    /// # Safety
    ///
    /// `address` must be non-null and point to a function with exactly the ABI that
    /// `operation.signature()` declares.
    unsafe fn bind(operation: Operation, address: *const ()) -> Self {
        debug_assert!(!address.is_null());
        let callable = unsafe {
            match operation.signature() {
                Signature::PathsToUnit => {
                    Callable::Extract(std::mem::transmute::<*const (), ExtractFn>(address))
                }
                Signature::PathToUnit => {
                    Callable::Query(std::mem::transmute::<*const (), QueryFn>(address))
                }
                Signature::PathToCount => {
                    Callable::Count(std::mem::transmute::<*const (), CountFn>(address))
                }
            }
        };
        Self {
            operation,
            callable,
            _source: PhantomData,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// # Safety
    ///
    /// The bound function must honour the engine contract for this operation, and the
    /// library it was resolved from must still be loaded.
    pub unsafe fn call_extract(&self, input: &CStr, output: &CStr) -> Result<(), Error> {
        match self.callable {
            Callable::Extract(func) => {
                unsafe { func(input.as_ptr(), output.as_ptr()) };
                Ok(())
            }
            _ => Err(self.signature_mismatch(Signature::PathsToUnit)),
        }
    }

    /// # Safety
    ///
    /// The bound function must honour the engine contract for this operation, and the
    /// library it was resolved from must still be loaded.
    pub unsafe fn call_query(&self, input: &CStr) -> Result<(), Error> {
        match self.callable {
            Callable::Query(func) => {
                unsafe { func(input.as_ptr()) };
                Ok(())
            }
            _ => Err(self.signature_mismatch(Signature::PathToUnit)),
        }
    }

    /// Returns the raw signed result; the caller decides what a negative value means.
    ///
    /// # Safety
    ///
    /// The bound function must honour the engine contract for this operation, and the
    /// library it was resolved from must still be loaded.
    pub unsafe fn call_count(&self, input: &CStr) -> Result<isize, Error> {
        match self.callable {
            Callable::Count(func) => Ok(unsafe { func(input.as_ptr()) }),
            _ => Err(self.signature_mismatch(Signature::PathToCount)),
        }
    }

    fn signature_mismatch(&self, requested: Signature) -> Error {
        Error::new(ErrorKind::Usage)
            .with_message(format!(
                "entry point is bound as {:?}, not {requested:?}",
                self.operation.signature()
            ))
            .with_symbol(self.operation.name())
    }
}

/// The fully resolved entry-point set for one session.
///
/// Borrows the source it was resolved from, so it cannot outlive the library:
///
/// ```compile_fail
/// use nitf_bind::core::registry::{EntryPoints, SymbolTable};
///
/// let entries = {
///     let table = SymbolTable::new();
///     EntryPoints::resolve(&table)
/// };
/// drop(entries);
/// ```
#[derive(Clone, Debug)]
pub struct EntryPoints<'src> {
    entries: Vec<EntryPoint<'src>>,
}

impl<'src> EntryPoints<'src> {
    /// Resolves every name in `Operation::ALL` from `source`, or fails on the first gap.
    pub fn resolve<S: SymbolSource + ?Sized>(source: &'src S) -> Result<Self, Error> {
        Self::resolve_unbound(source)
    }

    /// Same as `resolve` without tying the result to the borrow of `source`.
    ///
    /// The caller must keep `source` alive for as long as the result is used.
    pub(crate) fn resolve_unbound<S: SymbolSource + ?Sized>(source: &S) -> Result<Self, Error> {
        let mut entries = Vec::with_capacity(Operation::ALL.len());
        for operation in Operation::ALL {
            let Some(address) = source.lookup(operation.symbol()) else {
                warn!(symbol = operation.name(), "required engine entry point missing");
                return Err(Error::new(ErrorKind::SymbolNotFound)
                    .with_message("required engine entry point missing")
                    .with_symbol(operation.name()));
            };
            trace!(symbol = operation.name(), address = ?address, "entry point resolved");
            // The name/signature pairs in `Operation` are the engine's documented exports.
            entries.push(unsafe { EntryPoint::bind(operation, address) });
        }
        debug!(count = entries.len(), "engine entry points resolved");
        Ok(Self { entries })
    }

    pub fn get(&self, operation: Operation) -> &EntryPoint<'src> {
        &self.entries[operation.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntryPoint<'src>> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn noop_extract(_input: *const c_char, _output: *const c_char) {}

    unsafe extern "C" fn noop_query(_input: *const c_char) {}

    unsafe extern "C" fn seven(_input: *const c_char) -> isize {
        7
    }

    fn address_for(operation: Operation) -> *const () {
        match operation.signature() {
            Signature::PathsToUnit => noop_extract as ExtractFn as *const (),
            Signature::PathToUnit => noop_query as QueryFn as *const (),
            Signature::PathToCount => seven as CountFn as *const (),
        }
    }

    fn full_table() -> SymbolTable {
        Operation::ALL
            .into_iter()
            .fold(SymbolTable::new(), |table, operation| {
                table.with(operation.symbol(), address_for(operation))
            })
    }

    #[test]
    fn symbol_and_name_agree() {
        for operation in Operation::ALL {
            assert_eq!(operation.symbol().to_str().unwrap(), operation.name());
        }
    }

    #[test]
    fn all_is_in_index_order() {
        for (index, operation) in Operation::ALL.into_iter().enumerate() {
            assert_eq!(operation.index(), index);
        }
    }

    #[test]
    fn full_table_resolves_every_operation() {
        let table = full_table();
        let entries = EntryPoints::resolve(&table).expect("resolve");
        assert_eq!(entries.iter().count(), Operation::ALL.len());
        for operation in Operation::ALL {
            assert_eq!(entries.get(operation).operation(), operation);
        }
    }

    #[test]
    fn each_missing_name_is_reported_exactly() {
        for missing in Operation::ALL {
            let mut table = full_table();
            table.remove(missing.symbol());
            let err = EntryPoints::resolve(&table).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SymbolNotFound);
            assert_eq!(err.symbol(), Some(missing.name()));
        }
    }

    #[test]
    fn empty_source_fails_on_first_name() {
        let err = EntryPoints::resolve(&SymbolTable::new()).unwrap_err();
        assert_eq!(err.symbol(), Some("extract_jp2"));
    }

    #[test]
    fn null_addresses_are_not_recorded() {
        let table = SymbolTable::new().with(c"extract_jp2", std::ptr::null());
        assert!(table.is_empty());
        assert!(table.lookup(c"extract_jp2").is_none());
    }

    #[test]
    fn count_entry_returns_raw_value() {
        let table = full_table();
        let entries = EntryPoints::resolve(&table).expect("resolve");
        let value = unsafe { entries.get(Operation::NumDes).call_count(c"in.ntf") }.expect("call");
        assert_eq!(value, 7);
    }

    #[test]
    fn calling_through_wrong_signature_is_usage_error() {
        let table = full_table();
        let entries = EntryPoints::resolve(&table).expect("resolve");
        let err = unsafe { entries.get(Operation::NumImages).call_extract(c"a", c"b") }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.symbol(), Some("get_num_images_from_file"));

        let err = unsafe { entries.get(Operation::ExtractJp2).call_count(c"a") }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
