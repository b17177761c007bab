//! The request-handler interface and its interpreted implementation.

use async_trait::async_trait;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::adapter::ScriptAdapter;
use crate::policy::HostPolicy;
use crate::process::{self, Launch, ScriptRequest};
use polyglot_common::{Bundle, InvocationRequest, InvocationResponse, RuntimeError, ScriptingConfig};
use polyglot_core::LoggingHost;

/// Something that handles a request by writing a response.
///
/// Every language adapter satisfies this interface; the dispatcher never
/// inspects what the bundle's code evaluated to.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle `request`, writing status, headers and body into `response`.
    async fn handle(
        &self,
        request: &InvocationRequest,
        response: &mut InvocationResponse,
    ) -> Result<(), RuntimeError>;
}

/// Loads interpreted bundles as [`RequestHandler`]s.
#[derive(Debug, Clone, Default)]
pub struct ScriptRuntime {
    config: ScriptingConfig,
    policy: HostPolicy,
}

impl ScriptRuntime {
    /// Create a runtime with the given configuration.
    pub fn new(config: ScriptingConfig) -> Self {
        let policy = HostPolicy::new(config.host_access);
        Self { config, policy }
    }

    /// Scripting configuration.
    pub fn config(&self) -> &ScriptingConfig {
        &self.config
    }

    /// Prepare a fresh handler for one invocation of `bundle`.
    ///
    /// # Errors
    ///
    /// Returns a load error if the language is not interpreted, the policy
    /// refuses scripts, the entrypoint is missing or no interpreter is
    /// configured.
    pub fn load(&self, bundle: &Bundle) -> Result<ScriptHandler, RuntimeError> {
        let language = bundle.metadata().language;
        let adapter = ScriptAdapter::for_language(language)?;
        self.policy.check(language)?;
        let entrypoint = bundle.require_entrypoint()?;

        let program = self
            .config
            .interpreters
            .program_for(language)
            .ok_or_else(|| {
                RuntimeError::invalid_config(format!("no interpreter configured for {language}"))
            })?
            .to_string();

        Ok(ScriptHandler {
            launch: Launch {
                adapter,
                program,
                bundle: bundle.name().to_string(),
                directory: bundle.directory().to_path_buf(),
                entrypoint,
                policy: self.policy,
                timeout: self.config.timeout(),
                max_output_bytes: self.config.max_output_bytes,
            },
        })
    }

    /// Load `bundle` and run it against `request`.
    ///
    /// # Errors
    ///
    /// Returns the load or execution failure of this invocation.
    #[instrument(skip(self, bundle, request), fields(bundle = %bundle.name(), language = %bundle.metadata().language))]
    pub async fn invoke(
        &self,
        bundle: &Bundle,
        request: &InvocationRequest,
    ) -> Result<InvocationResponse, RuntimeError> {
        let handler = self.load(bundle)?;
        let mut response = InvocationResponse::default();
        handler.handle(request, &mut response).await?;
        Ok(response)
    }
}

/// A bundle entrypoint run by its interpreter.
///
/// Each call to [`RequestHandler::handle`] starts a new interpreter process,
/// so nothing survives between invocations.
#[derive(Debug, Clone)]
pub struct ScriptHandler {
    launch: Launch,
}

impl ScriptHandler {
    /// Language adapter of this handler.
    pub fn adapter(&self) -> ScriptAdapter {
        self.launch.adapter
    }
}

#[async_trait]
impl RequestHandler for ScriptHandler {
    async fn handle(
        &self,
        request: &InvocationRequest,
        response: &mut InvocationResponse,
    ) -> Result<(), RuntimeError> {
        let request_id = Uuid::new_v4().to_string();
        let mut logs = LoggingHost::new(&self.launch.bundle, request_id);
        let document = ScriptRequest::new(&self.launch.bundle, request);

        let written = process::run(&self.launch, &document, &mut logs).await?;
        debug!(
            status = written.status,
            guest_logs = logs.entries().len(),
            "Interpreted handler completed"
        );

        *response = written;
        Ok(())
    }
}
