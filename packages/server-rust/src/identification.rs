//! Tenant identification strategies reading the ambient request.
//!
//! Both strategies run when the middleware asks the multitenant container
//! for a scope factory, which happens after the request has been published
//! through the [`RequestContextAccessor`].

use std::fmt;

use tenantscope_core::{TenantId, TenantIdentificationStrategy};
use tracing::trace;

use crate::context::{RequestContextAccessor, TaskLocalContextAccessor};

/// Query-string parameter read by default.
pub const DEFAULT_TENANT_PARAMETER: &str = "tenant";

/// Header read by [`HeaderStrategy::default`].
pub const DEFAULT_TENANT_HEADER: &str = "x-tenant-id";

/// Identifies the tenant from a query-string parameter.
///
/// A missing parameter, an empty value, or no ambient request all mean
/// "no tenant".
pub struct QueryStringStrategy<A = TaskLocalContextAccessor> {
    parameter: String,
    accessor: A,
}

impl<A: RequestContextAccessor> QueryStringStrategy<A> {
    #[must_use]
    pub fn new(accessor: A) -> Self {
        Self::with_parameter(accessor, DEFAULT_TENANT_PARAMETER)
    }

    #[must_use]
    pub fn with_parameter(accessor: A, parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            accessor,
        }
    }

    #[must_use]
    pub fn parameter(&self) -> &str {
        &self.parameter
    }
}

impl Default for QueryStringStrategy {
    fn default() -> Self {
        Self::new(TaskLocalContextAccessor)
    }
}

impl<A: RequestContextAccessor> TenantIdentificationStrategy for QueryStringStrategy<A> {
    fn identify_tenant(&self) -> Option<TenantId> {
        let request = self.accessor.current_request()?;
        let value = request.query_param(&self.parameter)?;
        trace!(parameter = %self.parameter, value = %value, "tenant query parameter");
        (!value.is_empty()).then(|| TenantId::new(value))
    }
}

impl<A> fmt::Debug for QueryStringStrategy<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryStringStrategy")
            .field("parameter", &self.parameter)
            .finish_non_exhaustive()
    }
}

/// Identifies the tenant from a request header; blank values are ignored.
pub struct HeaderStrategy<A = TaskLocalContextAccessor> {
    header: String,
    accessor: A,
}

impl<A: RequestContextAccessor> HeaderStrategy<A> {
    #[must_use]
    pub fn new(accessor: A, header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            accessor,
        }
    }
}

impl Default for HeaderStrategy {
    fn default() -> Self {
        Self::new(TaskLocalContextAccessor, DEFAULT_TENANT_HEADER)
    }
}

impl<A: RequestContextAccessor> TenantIdentificationStrategy for HeaderStrategy<A> {
    fn identify_tenant(&self) -> Option<TenantId> {
        let request = self.accessor.current_request()?;
        let value = request.header(&self.header)?.trim();
        (!value.is_empty()).then(|| TenantId::new(value))
    }
}

impl<A> fmt::Debug for HeaderStrategy<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderStrategy")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::Request;

    use super::*;
    use crate::context::{AmbientSlot, CurrentRequest};

    fn in_request<R>(req: Request<()>, f: impl FnOnce() -> R) -> R {
        let slot = AmbientSlot::new();
        slot.set_if_absent(Arc::new(CurrentRequest::from_request(&req)));
        slot.sync_scope(f)
    }

    fn get(uri: &str) -> Request<()> {
        Request::get(uri).body(()).unwrap()
    }

    #[test]
    fn query_parameter_names_the_tenant() {
        let strategy = QueryStringStrategy::default();
        let tenant = in_request(get("/x?tenant=a"), || strategy.identify_tenant());
        assert_eq!(tenant, Some(TenantId::new("a")));
    }

    #[test]
    fn empty_or_missing_parameter_is_no_tenant() {
        let strategy = QueryStringStrategy::default();
        assert!(in_request(get("/x?tenant="), || strategy.identify_tenant()).is_none());
        assert!(in_request(get("/x?other=a"), || strategy.identify_tenant()).is_none());
        assert!(in_request(get("/x"), || strategy.identify_tenant()).is_none());
    }

    #[test]
    fn custom_parameter_name() {
        let strategy = QueryStringStrategy::with_parameter(TaskLocalContextAccessor, "org");
        assert_eq!(strategy.parameter(), "org");
        let tenant = in_request(get("/x?tenant=a&org=b"), || strategy.identify_tenant());
        assert_eq!(tenant, Some(TenantId::new("b")));
    }

    #[test]
    fn no_ambient_request_is_no_tenant() {
        assert!(QueryStringStrategy::default().identify_tenant().is_none());
        assert!(HeaderStrategy::default().identify_tenant().is_none());
    }

    #[test]
    fn header_names_the_tenant() {
        let strategy = HeaderStrategy::default();
        let req = Request::get("/")
            .header(DEFAULT_TENANT_HEADER, " b ")
            .body(())
            .unwrap();
        assert_eq!(in_request(req, || strategy.identify_tenant()), Some(TenantId::new("b")));

        let blank = Request::get("/")
            .header(DEFAULT_TENANT_HEADER, "")
            .body(())
            .unwrap();
        assert!(in_request(blank, || strategy.identify_tenant()).is_none());
    }
}
