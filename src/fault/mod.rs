//! Faults: the values that flow out of a handler when a request fails.
//!
//! A [`Fault`] is what a handler "throws". It carries the message, the error
//! that caused it (if any), and the [`Site`] it was raised from. The site is
//! captured when the fault is created:
//!
//! | Created by | File + line | Module + function |
//! |---|---|---|
//! | [`fault!`](crate::fault!) | yes | yes |
//! | [`Fault::new`] | yes (`#[track_caller]`) | no |
//! | `?` on any `std::error::Error` | yes (the `?`) | no |
//! | a panic in the handler | yes (panic hook) | no |
//!
//! ```rust
//! use faultgate::{fault, Fault, Request, Response};
//!
//! async fn get_user(req: Request) -> Result<Response, Fault> {
//!     let id: u64 = req.param("id").unwrap_or("").parse()?;
//!     if id == 0 {
//!         return Err(fault!("user {id} does not exist"));
//!     }
//!     Ok(Response::text("alice"))
//! }
//! ```

mod locate;
pub(crate) mod panic;

pub use locate::{FaultInfo, locate};

use std::fmt;
use std::panic::Location;

/// How the fault left the handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultKind {
    /// Returned as `Err(fault)`.
    Raised,
    /// Unwound out of the handler.
    Panicked,
}

/// Where a fault was raised.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Site {
    pub(crate) file: String,
    pub(crate) line: u32,
    pub(crate) declaring_type: Option<String>,
    pub(crate) function: Option<String>,
}

impl Site {
    /// A site with only a file and line.
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self { file: file.into(), line, declaring_type: None, function: None }
    }

    /// Builds a site from the raw `type_name` of a probe fn nested in the
    /// raising function (see [`fault!`](crate::fault!)).
    ///
    /// `demo::users::get_user::{{closure}}` yields declaring type
    /// `demo::users` and function `get_user`.
    #[doc(hidden)]
    pub fn from_probe(file: &str, line: u32, probe: &str) -> Self {
        let mut path = probe.strip_suffix("::__probe").unwrap_or(probe);
        while let Some(outer) = path.strip_suffix("::{{closure}}") {
            path = outer;
        }
        let (declaring_type, function) = match path.rsplit_once("::") {
            Some((ty, f)) => (Some(ty.to_owned()), Some(f.to_owned())),
            None if !path.is_empty() => (None, Some(path.to_owned())),
            None => (None, None),
        };
        Self { file: file.to_owned(), line, declaring_type, function }
    }

    pub fn file(&self) -> &str { &self.file }
    pub fn line(&self) -> u32 { self.line }
    pub fn declaring_type(&self) -> Option<&str> { self.declaring_type.as_deref() }
    pub fn function(&self) -> Option<&str> { self.function.as_deref() }
}

impl From<&Location<'_>> for Site {
    fn from(loc: &Location<'_>) -> Self {
        Self::new(loc.file(), loc.line())
    }
}

/// A failure raised while handling a request.
///
/// `Fault` deliberately does not implement `std::error::Error`: that is what
/// lets every error type convert into it with `?`. The original error stays
/// reachable through [`Fault::source`].
pub struct Fault {
    message: String,
    kind: FaultKind,
    site: Option<Site>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Fault {
    /// Raises a fault at the caller's location.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FaultKind::Raised,
            site: Some(Location::caller().into()),
            source: None,
        }
    }

    /// A fault with no site information at all.
    pub fn bare(message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: FaultKind::Raised, site: None, source: None }
    }

    pub(crate) fn panicked(message: String, site: Option<Site>) -> Self {
        Self { message, kind: FaultKind::Panicked, site, source: None }
    }

    /// Replaces the recorded site.
    pub fn at(mut self, site: Site) -> Self {
        self.site = Some(site);
        self
    }

    pub fn message(&self) -> &str { &self.message }
    pub fn kind(&self) -> FaultKind { self.kind }
    pub fn site(&self) -> Option<&Site> { self.site.as_ref() }

    /// The error this fault was converted from, if any.
    pub fn source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }
}

impl<E> From<E> for Fault
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[track_caller]
    fn from(e: E) -> Self {
        Self {
            message: e.to_string(),
            kind: FaultKind::Raised,
            site: Some(Location::caller().into()),
            source: Some(Box::new(e)),
        }
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("message", &self.message)
            .field("kind", &self.kind)
            .field("site", &self.site)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Raises a [`Fault`] with a formatted message and the full [`Site`] of the
/// call: file, line, module path and enclosing function.
#[macro_export]
macro_rules! fault {
    ($($arg:tt)+) => {{
        fn __probe() {}
        fn __name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::Fault::bare(::std::format!($($arg)+))
            .at($crate::fault::Site::from_probe(file!(), line!(), __name_of(__probe)))
    }};
}
