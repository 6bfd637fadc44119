use tableloop_agent::GenerationRequest;
use tableloop_executor::ArtifactPreview;
use tableloop_oracle::{Diagnostic, Table};

use crate::TaskSpec;

const SAMPLE_ROWS: usize = 3;

/// What the previous attempt produced and why it was rejected
#[derive(Debug, Clone, Copy)]
pub struct Feedback<'a> {
    pub attempt: usize,
    pub code: &'a str,
    pub diagnostic: &'a Diagnostic,
}

/// Builds generation requests.
///
/// Output is a pure function of its inputs: the same task, reference,
/// preview and feedback always produce the same bytes.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    entry_point: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new("parse")
    }
}

impl PromptBuilder {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
        }
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn build(
        &self,
        task: &TaskSpec,
        expected: &Table,
        preview: &ArtifactPreview,
        feedback: Option<Feedback<'_>>,
        attempt: usize,
    ) -> GenerationRequest {
        let mut prompt = self.base_prompt(task, expected, preview);
        if let Some(feedback) = feedback {
            prompt.push_str(&self.feedback_section(expected, feedback));
        }
        prompt.push_str(
            r#"

CRITICAL: Return ONLY the Python code, nothing else. No explanations, no markdown.
Start directly with 'import' statements.
"#,
        );

        GenerationRequest { prompt, attempt }
    }

    fn base_prompt(&self, task: &TaskSpec, expected: &Table, preview: &ArtifactPreview) -> String {
        let (rows, _) = expected.shape();
        let columns = expected.render_columns();
        let dtypes = expected.render_dtypes();

        let multi_page = if preview.page_count.is_some_and(|pages| pages > 1) {
            "\nIMPORTANT: This input has MULTIPLE PAGES and the table header is usually repeated on each page.\nYou MUST skip the header row on each page individually so no header ends up in your final data.\n"
        } else {
            ""
        };

        format!(
            r#"You are a Python coding expert. Write a complete Python parser function.

TASK: Create a function `{entry}(pdf_path)` that extracts the `{task_id}` table from the input document.

INPUT STRUCTURE:
{preview}
{multi_page}
REQUIRED OUTPUT SCHEMA:
Columns: {columns}
Data types: {dtypes}
Expected rows: {rows} (EXACTLY this many rows, no more, no less)

SAMPLE EXPECTED OUTPUT (first {sample} rows):
{head}

REQUIREMENTS:
1. Function signature: def {entry}(pdf_path: str) -> pd.DataFrame
2. Use the pdfplumber library to extract tables
3. Return a pandas DataFrame matching the schema EXACTLY
4. Column names must match exactly: {columns}
5. Handle data type conversions (dates, numbers) so every column has the dtype above
6. Leave empty cells empty (NaN), strip whitespace from text
7. Include proper imports at the top
8. Process each page separately

RECOMMENDED APPROACH:
```python
for page in pdf.pages:
    table = page.extract_table()
    if table:
        for row in table[1:]:  # Skip header on each page
            all_data.append(row)
```

CODE TEMPLATE:
```python
import pandas as pd
import pdfplumber


def {entry}(pdf_path: str) -> pd.DataFrame:
    '''Parse the input document and return a DataFrame'''
    # Your code here
    pass
```
"#,
            entry = self.entry_point,
            task_id = task.id(),
            preview = preview,
            multi_page = multi_page,
            columns = columns,
            dtypes = dtypes,
            rows = rows,
            sample = SAMPLE_ROWS,
            head = expected.render_head(SAMPLE_ROWS),
        )
    }

    fn feedback_section(&self, expected: &Table, feedback: Feedback<'_>) -> String {
        let guidance: String = self
            .guidance(expected, feedback.diagnostic)
            .iter()
            .map(|line| format!("- {}\n", line))
            .collect();

        format!(
            r#"

PREVIOUS ATTEMPT {attempt} FAILED ({kind}):
{diagnostic}

PREVIOUS CODE THAT FAILED:
```python
{code}
```

INSTRUCTIONS FOR FIX:
- Analyze the error above carefully
{guidance}- Make sure column names match EXACTLY
- Ensure data types are correct
- Test your logic mentally before responding

NOW WRITE THE CORRECTED CODE:
"#,
            attempt = feedback.attempt,
            kind = feedback.diagnostic.kind(),
            diagnostic = feedback.diagnostic,
            code = feedback.code,
            guidance = guidance,
        )
    }

    /// Fix hints keyed to what went wrong
    fn guidance(&self, expected: &Table, diagnostic: &Diagnostic) -> Vec<String> {
        let entry = &self.entry_point;
        match diagnostic {
            Diagnostic::ShapeMismatch { .. } if diagnostic.has_extra_rows() => vec![
                "You returned more rows than expected: header rows repeated on each page are most likely being kept as data".into(),
                "Process each page individually: for page in pdf.pages: ... for row in table[1:]: ...".into(),
                "Drop any row whose values equal the column names".into(),
            ],
            Diagnostic::ShapeMismatch { .. } if diagnostic.has_missing_rows() => vec![
                "You returned fewer rows than expected: make sure every page is processed".into(),
                "Do not filter out data rows while skipping headers; skip only the first row of each page's table".into(),
            ],
            Diagnostic::ShapeMismatch { .. } => vec![format!(
                "The column count is wrong: build the DataFrame with exactly these columns: {}",
                expected.render_columns()
            )],
            Diagnostic::SchemaMismatch { .. } => vec![format!(
                "Set the columns explicitly and in this order: df.columns = {}",
                expected.render_columns()
            )],
            Diagnostic::ValueMismatch { .. } if diagnostic.has_numeric_fill_mismatch() => vec![
                "Empty numeric cells must be NaN: use float('nan') for empty values, not 0.0".into(),
                "Convert numeric columns with pd.to_numeric(..., errors='coerce')".into(),
            ],
            Diagnostic::ValueMismatch { .. } => vec![
                "Compare the expected and actual first rows and dtypes above".into(),
                "Convert numeric columns with pd.to_numeric and keep text columns as stripped strings".into(),
            ],
            Diagnostic::TypeMismatch { .. } => vec![format!(
                "{}() must return a pandas DataFrame, not any other type",
                entry
            )],
            Diagnostic::LoadFailure { .. } => vec![
                "The module failed to import: fix the syntax error or missing import reported above".into(),
            ],
            Diagnostic::ContractViolation { .. } => vec![format!(
                "Define a top-level function `{}(pdf_path)` that takes exactly one argument",
                entry
            )],
            Diagnostic::RuntimeFailure { .. } => vec![
                "Read the traceback and fix the failing line".into(),
                "Guard against pages without tables and rows with missing cells".into(),
            ],
            Diagnostic::Timeout { .. } => vec![
                "The previous code ran too long: open the document once and visit each page once".into(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tableloop_oracle::{Cell, DType};

    fn task() -> TaskSpec {
        TaskSpec::new("icici", "data/icici/icici_sample.pdf", "data/icici/icici_sample.csv", 3)
            .unwrap()
    }

    fn expected() -> Table {
        Table::new(
            vec!["Date".into(), "Description".into(), "Amount".into()],
            vec![DType::Object, DType::Object, DType::Float64],
            (0..5)
                .map(|i| {
                    vec![
                        Cell::Str(format!("0{}-08-2024", i + 1)),
                        Cell::Str("Salary Credit".into()),
                        Cell::Float(100.5 * i as f64),
                    ]
                })
                .collect(),
        )
        .unwrap()
    }

    fn preview() -> ArtifactPreview {
        ArtifactPreview {
            page_count: Some(2),
            text_sample: Some("Date Description Amount".into()),
            table_count: Some(1),
            first_table_rows: Some(36),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_attempt_describes_schema() {
        let request = PromptBuilder::default().build(&task(), &expected(), &preview(), None, 1);
        let prompt = &request.prompt;

        assert_eq!(request.attempt, 1);
        assert!(prompt.contains("Columns: ['Date', 'Description', 'Amount']"));
        assert!(prompt.contains(
            "Data types: {'Date': dtype('object'), 'Description': dtype('object'), 'Amount': dtype('float64')}"
        ));
        assert!(prompt.contains("Expected rows: 5 (EXACTLY this many rows"));
        assert!(prompt.contains("Input has 2 page(s)"));
        assert!(prompt.contains("MULTIPLE PAGES"));
        assert!(prompt.contains("0  01-08-2024"));
        assert!(!prompt.contains("3  04-08-2024"));
        assert!(!prompt.contains("PREVIOUS ATTEMPT"));
        assert!(prompt.trim_end().ends_with("Start directly with 'import' statements."));
    }

    #[test]
    fn test_single_page_input_has_no_multi_page_warning() {
        let mut preview = preview();
        preview.page_count = Some(1);
        let request = PromptBuilder::default().build(&task(), &expected(), &preview, None, 1);
        assert!(!request.prompt.contains("MULTIPLE PAGES"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let builder = PromptBuilder::default();
        let diagnostic = Diagnostic::ShapeMismatch {
            expected: (5, 3),
            actual: (7, 3),
        };
        let feedback = Feedback {
            attempt: 1,
            code: "import pandas as pd",
            diagnostic: &diagnostic,
        };
        let a = builder.build(&task(), &expected(), &preview(), Some(feedback), 2);
        let b = builder.build(&task(), &expected(), &preview(), Some(feedback), 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_retry_embeds_code_and_diagnostic_verbatim() {
        let diagnostic = Diagnostic::ShapeMismatch {
            expected: (5, 3),
            actual: (7, 3),
        };
        let code = "import pandas as pd\n\ndef parse(pdf_path):\n    return pd.DataFrame()";
        let request = PromptBuilder::default().build(
            &task(),
            &expected(),
            &preview(),
            Some(Feedback {
                attempt: 1,
                code,
                diagnostic: &diagnostic,
            }),
            2,
        );

        assert!(request
            .prompt
            .contains("PREVIOUS ATTEMPT 1 FAILED (SHAPE MISMATCH):"));
        assert!(request.prompt.contains(&diagnostic.to_string()));
        assert!(request.prompt.contains(code));
        assert!(request.prompt.contains("header rows repeated on each page"));
    }

    #[test]
    fn test_numeric_fill_guidance() {
        let expected = expected();
        let diagnostic = Diagnostic::ValueMismatch {
            expected_first_row: vec![("Amount".into(), Cell::Null)],
            actual_first_row: vec![("Amount".into(), Cell::Float(0.0))],
            expected_dtypes: expected.dtype_map(),
            actual_dtypes: expected.dtype_map(),
            first_difference: None,
        };
        let guidance = PromptBuilder::default().guidance(&expected, &diagnostic);
        assert!(guidance.iter().any(|g| g.contains("float('nan')")));
    }

    #[test]
    fn test_contract_guidance_uses_entry_point() {
        let diagnostic = Diagnostic::ContractViolation {
            violation: tableloop_oracle::ContractViolation::MissingEntryPoint {
                name: "extract".into(),
            },
        };
        let builder = PromptBuilder::new("extract");
        let guidance = builder.guidance(&expected(), &diagnostic);
        assert!(guidance[0].contains("`extract(pdf_path)`"));

        let request = builder.build(&task(), &expected(), &preview(), None, 1);
        assert!(request.prompt.contains("def extract(pdf_path: str) -> pd.DataFrame"));
    }

    #[test]
    fn test_unavailable_preview_is_reported() {
        let preview = ArtifactPreview::unavailable("No module named 'pdfplumber'");
        let request = PromptBuilder::default().build(&task(), &expected(), &preview, None, 1);
        assert!(request
            .prompt
            .contains("Could not analyze input: No module named 'pdfplumber'"));
    }
}
