//! LibXML2 FFI wrapper for XML Schema compilation and in-memory validation.
//!
//! No mature pure-Rust XSD validator exists, so schemas are compiled and
//! enforced through direct libxml2 FFI.
//!
//! ## Thread Safety
//!
//! - **Schema parsing** is not thread-safe in libxml2 and is serialised
//!   through a process-wide lock.
//! - **Validation** is thread-safe for distinct documents: every call creates
//!   its own validation context against a shared, read-only schema pointer.
//! - Compiled schemas are shared through `Arc`-wrapped pointers freed once on
//!   drop.

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};

use libc::{c_char, c_int};

use crate::error::{LibXml2Error, LibXml2Result};

/// Global initialization flag for libxml2
static LIBXML2_INIT: Once = Once::new();

/// Serialises schema parsing across all wrapper instances
static SCHEMA_PARSE_LOCK: Mutex<()> = Mutex::new(());

/// Forbid network access while parsing documents
const XML_PARSE_NONET: c_int = 1 << 11;
const XML_PARSE_NOERROR: c_int = 1 << 5;
const XML_PARSE_NOWARNING: c_int = 1 << 6;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();
    pub fn xmlInitGlobals();

    // Schema parsing
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaNewParserCtxt(url: *const c_char) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut libc::c_void,
    );
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Document parsing
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);

    // Schema validation
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaValidateDoc(ctxt: *mut XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut libc::c_void,
    );
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut libc::c_void,
    pub node: *mut libc::c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut libc::c_void, error: *mut xmlError)>;

/// Collects structured libxml2 error messages into a `Vec<String>`
unsafe extern "C" fn structured_error_callback(user_data: *mut libc::c_void, error: *mut xmlError) {
    let errors = unsafe { &mut *(user_data as *mut Vec<String>) };

    if !error.is_null() {
        let msg_ptr = unsafe { (*error).message };
        let line = unsafe { (*error).line };
        if !msg_ptr.is_null() {
            let c_str = unsafe { CStr::from_ptr(msg_ptr) };
            if let Ok(s) = c_str.to_str() {
                if line > 0 {
                    errors.push(format!("line {}: {}", line, s.trim()));
                } else {
                    errors.push(s.trim().to_string());
                }
            }
        }
    }
}

/// Thread-safe, reference-counted handle to a compiled libxml2 schema
#[derive(Debug, Clone)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: compiled xmlSchema structures are read-only after parsing and
// libxml2 documents them as safe to share between validating threads.
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// # Safety
    ///
    /// `ptr` must come from `xmlSchemaParse` and must not be freed elsewhere.
    pub(crate) unsafe fn from_raw(ptr: *mut XmlSchema) -> LibXml2Result<Self> {
        if ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed { errors: Vec::new() });
        }

        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                _phantom: PhantomData,
            }),
        })
    }

    pub(crate) fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
    }

    pub fn is_valid(&self) -> bool {
        !self.inner.ptr.is_null()
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlSchemaFree(self.ptr);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Outcome of validating one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid {
        error_count: i32,
        errors: Vec<String>,
    },
    InternalError {
        code: i32,
    },
}

impl ValidationResult {
    /// Map a libxml2 return code and captured messages to a result
    pub fn from_code(code: c_int, errors: Vec<String>) -> Self {
        match code {
            0 => ValidationResult::Valid,
            n if n > 0 => ValidationResult::Invalid {
                error_count: n,
                errors,
            },
            n => ValidationResult::InternalError { code: n },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationResult::Invalid { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationResult::InternalError { .. })
    }
}

/// Safe entry point to the libxml2 calls used by schema compilation and validation
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Initializes libxml2 once per process
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            xmlInitGlobals();
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Parse a self-contained schema document held in memory
    pub fn parse_schema_from_memory(&self, schema_data: &[u8]) -> LibXml2Result<XmlSchemaPtr> {
        let size = c_int::try_from(schema_data.len()).map_err(|_| LibXml2Error::MemoryAllocation)?;
        let _guard = SCHEMA_PARSE_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        unsafe {
            let parser_ctxt = xmlSchemaNewMemParserCtxt(schema_data.as_ptr() as *const c_char, size);
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }

            let errors = parse_with_context(parser_ctxt);
            match errors {
                Ok(schema) => Ok(schema),
                Err(errors) => Err(LibXml2Error::SchemaParseFailed { errors }),
            }
        }
    }

    /// Parse a schema from disk; relative imports and includes resolve against its directory
    pub fn parse_schema_from_file(&self, path: &Path) -> LibXml2Result<XmlSchemaPtr> {
        let c_path = path
            .to_str()
            .and_then(|s| CString::new(s).ok())
            .ok_or_else(|| LibXml2Error::SchemaFileParseFailed {
                path: path.to_path_buf(),
                errors: vec!["path is not valid UTF-8".to_string()],
            })?;
        let _guard = SCHEMA_PARSE_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        unsafe {
            let parser_ctxt = xmlSchemaNewParserCtxt(c_path.as_ptr());
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }

            parse_with_context(parser_ctxt).map_err(|errors| LibXml2Error::SchemaFileParseFailed {
                path: path.to_path_buf(),
                errors,
            })
        }
    }

    /// Validate an XML document held in memory against a compiled schema
    pub fn validate_memory(
        &self,
        schema: &XmlSchemaPtr,
        xml_content: &[u8],
    ) -> LibXml2Result<ValidationResult> {
        let size = c_int::try_from(xml_content.len()).map_err(|_| LibXml2Error::MemoryAllocation)?;

        unsafe {
            let doc = xmlReadMemory(
                xml_content.as_ptr() as *const c_char,
                size,
                std::ptr::null(),
                std::ptr::null(),
                XML_PARSE_NONET | XML_PARSE_NOERROR | XML_PARSE_NOWARNING,
            );
            if doc.is_null() {
                return Err(LibXml2Error::DocumentParseFailed {
                    details: "document is not well-formed XML".to_string(),
                });
            }

            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                xmlFreeDoc(doc);
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            let mut errors = Vec::new();
            let errors_ptr = &mut errors as *mut Vec<String> as *mut libc::c_void;
            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                errors_ptr,
            );

            let result_code = xmlSchemaValidateDoc(valid_ctxt, doc);

            xmlSchemaFreeValidCtxt(valid_ctxt);
            xmlFreeDoc(doc);

            let result = ValidationResult::from_code(result_code, errors);
            if let ValidationResult::InternalError { code } = result {
                return Err(LibXml2Error::ValidationFailed { code });
            }

            Ok(result)
        }
    }
}

/// Run `xmlSchemaParse` on a fresh parser context, freeing the context afterwards.
///
/// # Safety
///
/// `parser_ctxt` must be a valid, non-null parser context; the caller must hold
/// `SCHEMA_PARSE_LOCK`.
unsafe fn parse_with_context(
    parser_ctxt: *mut XmlSchemaParserCtxt,
) -> Result<XmlSchemaPtr, Vec<String>> {
    let mut errors: Vec<String> = Vec::new();
    let errors_ptr = &mut errors as *mut Vec<String> as *mut libc::c_void;

    unsafe {
        xmlSchemaSetParserStructuredErrors(
            parser_ctxt,
            Some(structured_error_callback),
            errors_ptr,
        );
        let schema_ptr = xmlSchemaParse(parser_ctxt);
        xmlSchemaFreeParserCtxt(parser_ctxt);

        if schema_ptr.is_null() {
            return Err(errors);
        }
        XmlSchemaPtr::from_raw(schema_ptr).map_err(|_| errors)
    }
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}
