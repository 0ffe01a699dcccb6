/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The remote service could not be reached.
    Unreachable,
    /// The model provider is rate limited.
    RateLimited,
    /// The request exceeded its bounded wait.
    Timeout,
    /// The service returned output the provider could not parse.
    MalformedOutput,
    /// The content is moderated.
    Moderated,
    /// Any other errors.
    Other,
}

impl ErrorKind {
    /// Whether a request that failed with this kind is worth retrying.
    ///
    /// Transient transport conditions are retryable; anything that would
    /// deterministically fail again is not.
    #[inline]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Unreachable | ErrorKind::RateLimited | ErrorKind::Timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Unreachable.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::MalformedOutput.is_retryable());
        assert!(!ErrorKind::Moderated.is_retryable());
        assert!(!ErrorKind::Other.is_retryable());
    }
}
