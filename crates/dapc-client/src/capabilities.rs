//! DAP capabilities tracking.

use crate::protocol::{Capabilities, ExceptionBreakpointsFilter};

/// Resolved capabilities of the debug adapter, stored as plain booleans.
///
/// Only the capabilities this client acts on are resolved; the raw
/// [`Capabilities`] stay available on the client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DapCapabilities {
    /// Whether the adapter supports `configurationDone`.
    pub supports_configuration_done_request: bool,
    /// Whether the adapter supports function breakpoints.
    pub supports_function_breakpoints: bool,
    /// Whether the adapter supports conditional breakpoints.
    pub supports_conditional_breakpoints: bool,
    /// Whether the adapter supports hit-count breakpoints.
    pub supports_hit_conditional_breakpoints: bool,
    /// Whether the adapter supports logpoints.
    pub supports_log_points: bool,
    /// Whether the adapter supports `evaluate` for hovers.
    pub supports_evaluate_for_hovers: bool,
    /// Whether the adapter supports stepping backwards.
    pub supports_step_back: bool,
    /// Whether the adapter supports setting variable values.
    pub supports_set_variable: bool,
    /// Whether the adapter supports the `restart` request.
    pub supports_restart_request: bool,
    /// Whether the adapter supports the `terminate` request.
    pub supports_terminate_request: bool,
    /// Whether `disconnect` honors `terminateDebuggee`.
    pub support_terminate_debuggee: bool,
    /// Whether the adapter supports the `cancel` request.
    pub supports_cancel_request: bool,
    /// Whether the adapter supports the `modules` request.
    pub supports_modules_request: bool,
    /// Whether the adapter supports the `loadedSources` request.
    pub supports_loaded_sources_request: bool,
    /// Whether the adapter supports the `exceptionInfo` request.
    pub supports_exception_info_request: bool,
    /// Whether stepping requests accept a granularity.
    pub supports_stepping_granularity: bool,
    /// Whether stepping requests accept `singleThread`.
    pub supports_single_thread_execution_requests: bool,
    /// Exception filters offered for `setExceptionBreakpoints`.
    pub exception_breakpoint_filters: Vec<ExceptionBreakpointsFilter>,
}

impl DapCapabilities {
    /// Build [`DapCapabilities`] from the protocol-level [`Capabilities`]
    /// returned by the adapter in the `initialize` response.
    pub fn from_initialize_response(caps: &Capabilities) -> Self {
        Self {
            supports_configuration_done_request: caps
                .supports_configuration_done_request
                .unwrap_or(false),
            supports_function_breakpoints: caps.supports_function_breakpoints.unwrap_or(false),
            supports_conditional_breakpoints: caps
                .supports_conditional_breakpoints
                .unwrap_or(false),
            supports_hit_conditional_breakpoints: caps
                .supports_hit_conditional_breakpoints
                .unwrap_or(false),
            supports_log_points: caps.supports_log_points.unwrap_or(false),
            supports_evaluate_for_hovers: caps.supports_evaluate_for_hovers.unwrap_or(false),
            supports_step_back: caps.supports_step_back.unwrap_or(false),
            supports_set_variable: caps.supports_set_variable.unwrap_or(false),
            supports_restart_request: caps.supports_restart_request.unwrap_or(false),
            supports_terminate_request: caps.supports_terminate_request.unwrap_or(false),
            support_terminate_debuggee: caps.support_terminate_debuggee.unwrap_or(false),
            supports_cancel_request: caps.supports_cancel_request.unwrap_or(false),
            supports_modules_request: caps.supports_modules_request.unwrap_or(false),
            supports_loaded_sources_request: caps
                .supports_loaded_sources_request
                .unwrap_or(false),
            supports_exception_info_request: caps
                .supports_exception_info_request
                .unwrap_or(false),
            supports_stepping_granularity: caps.supports_stepping_granularity.unwrap_or(false),
            supports_single_thread_execution_requests: caps
                .supports_single_thread_execution_requests
                .unwrap_or(false),
            exception_breakpoint_filters: caps
                .exception_breakpoint_filters
                .clone()
                .unwrap_or_default(),
        }
    }

    /// Filters the adapter marks as enabled by default.
    pub fn default_exception_filters(&self) -> Vec<String> {
        self.exception_breakpoint_filters
            .iter()
            .filter(|f| f.default.unwrap_or(false))
            .map(|f| f.filter.clone())
            .collect()
    }
}
