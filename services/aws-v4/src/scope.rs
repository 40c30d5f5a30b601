use std::fmt::{Display, Formatter};

use chunksign_core::time::{format_date, format_iso8601, DateTime};

use crate::constants::AWS4_REQUEST;

/// CredentialScope binds a signature to a day, a region and a service.
///
/// It is built once per signing operation from the effective signing time
/// and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialScope {
    region: String,
    service: String,
    date: String,
    instant: DateTime,
}

impl CredentialScope {
    /// Create a new scope at the given instant.
    pub fn new(region: &str, service: &str, instant: DateTime) -> Self {
        Self {
            region: region.to_string(),
            service: service.to_string(),
            date: format_date(instant),
            instant,
        }
    }

    /// Region of this scope.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Service of this scope.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Date in `YYYYMMDD`, drives key derivation and key cache validity.
    pub fn date(&self) -> &str {
        &self.date
    }

    /// The signing instant.
    pub fn instant(&self) -> DateTime {
        self.instant
    }

    /// The signing instant in `yyyyMMdd'T'HHmmss'Z'`.
    pub fn datetime(&self) -> String {
        format_iso8601(self.instant)
    }

    /// Scope used by SigV4a, the region travels in `x-amz-region-set` instead.
    ///
    /// `20220313/s3/aws4_request`
    pub fn to_asymmetric_string(&self) -> String {
        format!("{}/{}/{}", self.date, self.service, AWS4_REQUEST)
    }
}

/// `20220313/us-east-1/s3/aws4_request`
impl Display for CredentialScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.date, self.region, self.service, AWS4_REQUEST
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_scope_strings() {
        let t = Utc
            .with_ymd_and_hms(2022, 3, 13, 7, 20, 4)
            .single()
            .expect("must be valid");
        let scope = CredentialScope::new("us-east-1", "s3", t);

        assert_eq!(scope.date(), "20220313");
        assert_eq!(scope.datetime(), "20220313T072004Z");
        assert_eq!(scope.to_string(), "20220313/us-east-1/s3/aws4_request");
        assert_eq!(scope.to_asymmetric_string(), "20220313/s3/aws4_request");
    }
}
