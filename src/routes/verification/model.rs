use serde::Deserialize;

/// Applicant fields travel as query parameters, the document as the body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuery {
    pub file_name: String,
    pub enrollment_number: Option<String>,
    pub course: Option<String>,
    pub batch: Option<String>,
}
