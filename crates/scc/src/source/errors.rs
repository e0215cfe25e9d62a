use std::time::Duration;

use thiserror::Error;

/// Errors produced by the provider facades and the retry layer.
///
/// Adapter-specific failures are classified into these variants at the
/// adapter boundary, so callers branch on [`SourceError::kind`] or
/// [`SourceError::has_kind`] instead of matching message text.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Malformed input: bad page request, unparseable token, bad full name.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The provider answered, but not the way a usable token should.
    #[error("verification failed: {message}{}", reply_suffix(.status, .body))]
    ProviderVerification {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    /// A secret with the requested name is already present on the repo.
    #[error("repo has already been connected to a policy: {repo}")]
    RepoAlreadyConnected { repo: String },

    /// A bounded retry gave up. Wraps the last observed cause.
    #[error("timeout after multiple retries ({reason}): {source}")]
    RetryTimeoutExceeded {
        reason: String,
        #[source]
        source: Box<SourceError>,
    },

    /// The repository or branch has no commits yet.
    #[error("repository {repo} is empty")]
    RepoEmpty { repo: String },

    /// A freshly written commit is not yet readable.
    #[error("commit {sha} not found in {repo}")]
    CommitNotFound { sha: String, repo: String },

    /// Provider-signalled secondary rate limit; safe to retry after the wait.
    #[error("secondary rate limit exceeded, retry after {retry_after:?}")]
    SecondaryRateLimit { retry_after: Duration },

    /// Resource not found (repo, ref, variable, file, ...).
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Any other non-success reply.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never got a reply.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// The reply could not be decoded.
    #[error("decode error: {message}")]
    Decode { message: String },

    /// Operation context wrapped around a cause.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<SourceError>,
    },
}

/// Discriminant of [`SourceError`] without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    ProviderVerification,
    RepoAlreadyConnected,
    RetryTimeoutExceeded,
    RepoEmpty,
    CommitNotFound,
    SecondaryRateLimit,
    NotFound,
    Api,
    Connection,
    Decode,
}

fn reply_suffix(status: &Option<u16>, body: &Option<String>) -> String {
    match (status, body.as_deref()) {
        (Some(status), Some(body)) if !body.is_empty() => format!(" (status {status}): {body}"),
        (Some(status), _) => format!(" (status {status})"),
        _ => String::new(),
    }
}

impl SourceError {
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    #[inline]
    pub fn verification(message: impl Into<String>) -> Self {
        Self::ProviderVerification {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    /// Verification failure carrying the provider's reply.
    #[inline]
    pub fn unexpected_reply(
        message: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self::ProviderVerification {
            message: message.into(),
            status: Some(status),
            body: Some(body.into()),
        }
    }

    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    #[inline]
    pub fn retry_timeout(reason: impl Into<String>, last: SourceError) -> Self {
        Self::RetryTimeoutExceeded {
            reason: reason.into(),
            source: Box::new(last),
        }
    }

    /// Wrap this error with the name of the operation that failed.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Kind of this error, looking through [`SourceError::Context`] layers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::ProviderVerification { .. } => ErrorKind::ProviderVerification,
            Self::RepoAlreadyConnected { .. } => ErrorKind::RepoAlreadyConnected,
            Self::RetryTimeoutExceeded { .. } => ErrorKind::RetryTimeoutExceeded,
            Self::RepoEmpty { .. } => ErrorKind::RepoEmpty,
            Self::CommitNotFound { .. } => ErrorKind::CommitNotFound,
            Self::SecondaryRateLimit { .. } => ErrorKind::SecondaryRateLimit,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Api { .. } => ErrorKind::Api,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Whether `kind` appears anywhere in the chain, including causes
    /// wrapped by [`SourceError::RetryTimeoutExceeded`].
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        let mut current = self;
        loop {
            match current {
                Self::Context { source, .. } => current = source.as_ref(),
                Self::RetryTimeoutExceeded { source, .. } => {
                    if kind == ErrorKind::RetryTimeoutExceeded {
                        return true;
                    }
                    current = source.as_ref();
                }
                other => return other.kind() == kind,
            }
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// HTTP status of an [`SourceError::Api`] error, looking through context.
    pub fn api_status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Context { source, .. } => source.api_status(),
            _ => None,
        }
    }

    /// Cooldown requested by the provider, if this is a secondary rate limit.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::SecondaryRateLimit { retry_after } => Some(*retry_after),
            Self::Context { source, .. } => source.retry_after(),
            _ => None,
        }
    }
}

/// First line of an error message, for log lines and terminal output.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;
