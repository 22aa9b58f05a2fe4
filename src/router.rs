mod error;
mod path;
mod pattern;
mod record;
mod table;

use std::{fmt, sync::Arc};

use log::{info, warn};

use serde::{Deserialize, Serialize};

use crate::{
    config::{HandlerConfiguration, HandlerDefinition},
    handlers::{default::DefaultHandler, HandlerFactory, RequestHandler},
};

pub use error::RouteError;
pub use path::normalize;
pub use pattern::UriPattern;
pub use record::{HandlerRecord, HandlerStatus, LiveCall, Mutability};
pub use table::{DrainPolicy, HandlerTable};

/// Pattern the built-in default handler is installed at.
pub const DEFAULT_HANDLER_PATTERN: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Maps a CGI `REQUEST_METHOD`; HEAD is routed like GET.
    pub fn from_request_method(request_method: &str) -> Option<Self> {
        match request_method.to_ascii_uppercase().as_str() {
            "GET" | "HEAD" => Some(Self::Get),
            "POST" => Some(Self::Post),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GET and POST handler tables behind one facade.
///
/// Every pattern and URI passed in is normalized first, so `/Status/` and
/// `/status` name the same entry. The two tables have independent locks.
///
/// When no pattern matches, `dispatch` returns `RouteError::NotFound`. The
/// built-in default handler answers only the root path `/`.
pub struct Router {
    get_table: HandlerTable,
    post_table: HandlerTable,
}

impl Router {
    pub fn new(drain_policy: DrainPolicy) -> Result<Self, RouteError> {
        let router = Self {
            get_table: HandlerTable::new(Method::Get, drain_policy),
            post_table: HandlerTable::new(Method::Post, drain_policy),
        };

        router.register_get(
            DEFAULT_HANDLER_PATTERN,
            Arc::new(DefaultHandler::new()),
            Mutability::Immutable,
        )?;

        Ok(router)
    }

    fn table(&self, method: Method) -> &HandlerTable {
        match method {
            Method::Get => &self.get_table,
            Method::Post => &self.post_table,
        }
    }

    pub fn register(
        &self,
        method: Method,
        pattern: &str,
        handler: Arc<dyn RequestHandler>,
        mutability: Mutability,
    ) -> Result<(), RouteError> {
        self.table(method)
            .register(&normalize_pattern(pattern)?, handler, mutability)
    }

    pub fn register_get(
        &self,
        pattern: &str,
        handler: Arc<dyn RequestHandler>,
        mutability: Mutability,
    ) -> Result<(), RouteError> {
        self.register(Method::Get, pattern, handler, mutability)
    }

    pub fn register_post(
        &self,
        pattern: &str,
        handler: Arc<dyn RequestHandler>,
        mutability: Mutability,
    ) -> Result<(), RouteError> {
        self.register(Method::Post, pattern, handler, mutability)
    }

    pub fn check_exists(&self, method: Method, pattern: &str) -> bool {
        self.table(method).exists(&normalize(pattern))
    }

    pub fn set_enabled(&self, method: Method, pattern: &str, on: bool) -> Result<(), RouteError> {
        self.table(method).set_enabled(&normalize(pattern), on)
    }

    /// Hot-swap the handler at `pattern`.
    ///
    /// Code backing the old handler may be unloaded only after this returns
    /// `Ok`. `Busy` leaves the old handler installed and dispatchable.
    pub fn replace(
        &self,
        method: Method,
        pattern: &str,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), RouteError> {
        self.table(method).replace(&normalize(pattern), handler)
    }

    /// Select the handler for `uri`. The returned `LiveCall` keeps the
    /// handler marked as executing until it is dropped.
    pub fn dispatch(&self, method: Method, uri: &str) -> Result<LiveCall, RouteError> {
        self.table(method).find(&normalize(uri))
    }

    pub fn snapshot(&self) -> Vec<HandlerStatus> {
        let mut statuses = self.get_table.snapshot();
        statuses.append(&mut self.post_table.snapshot());
        statuses
    }

    /// Bring the tables in line with `handlers`.
    ///
    /// Absent entries are registered, entries whose description differs from
    /// the configured definition are replaced, and every entry is switched
    /// to its configured enabled state. All entries are attempted before
    /// any failure is reported.
    pub fn apply_config(
        &self,
        handlers: &[HandlerConfiguration],
        factory: &dyn HandlerFactory,
    ) -> Result<(), RouteError> {
        let mut failures = Vec::new();

        for handler_configuration in handlers {
            if let Err(err) = self.apply_handler_configuration(handler_configuration, factory) {
                warn!(
                    "apply_config {} '{}' failed: {:#}",
                    handler_configuration.method(),
                    handler_configuration.pattern(),
                    err
                );
                failures.push(format!(
                    "{} '{}': {:#}",
                    handler_configuration.method(),
                    handler_configuration.pattern(),
                    err
                ));
            }
        }

        if failures.is_empty() {
            info!("apply_config applied {} entries", handlers.len());
            Ok(())
        } else {
            Err(RouteError::PartialFailure(failures))
        }
    }

    fn apply_handler_configuration(
        &self,
        handler_configuration: &HandlerConfiguration,
        factory: &dyn HandlerFactory,
    ) -> anyhow::Result<()> {
        let method = *handler_configuration.method();
        let pattern = normalize_pattern(handler_configuration.pattern())?;
        let table = self.table(method);
        let enabled = *handler_configuration.enabled();

        // stop new calls before a swap has to wait for running ones
        if !enabled && table.exists(&pattern) {
            switch(table, &pattern, false)?;
        }

        let install_result =
            Self::install_handler(table, &pattern, handler_configuration.handler(), factory);

        let switch_result = if table.exists(&pattern) {
            switch(table, &pattern, enabled)
        } else {
            Ok(())
        };

        install_result?;
        switch_result?;

        Ok(())
    }

    fn install_handler(
        table: &HandlerTable,
        pattern: &str,
        definition: &HandlerDefinition,
        factory: &dyn HandlerFactory,
    ) -> anyhow::Result<()> {
        match table.description(pattern) {
            None => {
                let handler = factory.create(definition)?;
                table.register(pattern, handler, Mutability::Replaceable)?;
            }
            Some(description) if description != definition.description() => {
                let handler = factory.create(definition)?;
                table.replace(pattern, handler)?;
            }
            Some(_) => {}
        }

        Ok(())
    }
}

/// `set_enabled` treating `AlreadyInState` as success.
fn switch(table: &HandlerTable, pattern: &str, on: bool) -> Result<(), RouteError> {
    match table.set_enabled(pattern, on) {
        Ok(()) | Err(RouteError::AlreadyInState) => Ok(()),
        Err(err) => Err(err),
    }
}

/// Normalize a pattern, rejecting escapes that lowercasing would change.
///
/// `\D`, `\S`, `\W`, `\B` and other uppercase escapes would silently turn
/// into their lowercase counterparts, so they are refused.
fn normalize_pattern(pattern: &str) -> Result<String, RouteError> {
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(escaped) if escaped.is_ascii_uppercase() => {
                    return Err(RouteError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: format!("escape '\\{}' does not survive lowercasing", escaped),
                    });
                }
                _ => {}
            }
        }
    }

    Ok(normalize(pattern))
}
