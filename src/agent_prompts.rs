//! Agent Prompts - instruction payloads for the two oracle calls
//!
//! The synthesis prompt fixes the reply contract (`{"query": [{"SQL": "..."}]}`) that
//! [`crate::synthesizer::parse_candidate`] relies on. The summary prompt keeps the answer
//! in the business's own vocabulary.

use crate::execution_loop::RepairHint;
use itertools::Itertools;

/// Instructions for turning a question into one SQL statement. `{schema}` is replaced
/// with the serialized schema document.
pub const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are a data retrieval assistant. You read questions written in plain English or Turkish and turn each one into a single, precise SQL statement for the database described below.

## Database

The database is made of the following tables. Every table lists its columns with their declared types, followed by a few example rows:

{schema}

## What to do

1. Work out exactly what the user is asking for.
2. Write one complete SQL query that answers it.
3. Use table and column names exactly as they appear in the schema above. Do not invent names.

## Reply format

Reply with JSON only, in exactly this structure, and nothing else (no prose, no comments, no code fences):

{"query": [{"SQL": "SELECT column1, column2 FROM table_name WHERE condition"}]}

## Rules

- Questions starting with "Who ..." or "Which employee ..." expect names: always select the person's name columns.
- When the question names a category such as gender, age or department, select that attribute too, next to the value that was asked for.
  Example: for "Show me salaries of female employees in the Development department", select the gender and the department name alongside the salary.
- Keep the query efficient and unambiguous; qualify columns when more than one table is joined.
"#;

/// Questions offered to new users
pub const EXAMPLE_REQUESTS: &[&str] = &[
    "Show me all departments",
    "List employees who earn more than 100000",
    "Which employee earns the most salary?",
    "What is the average salary of employees?",
    "Show me female employees in the Development department",
    "List employees hired between 2000 and 2001",
    "Find employees who have changed departments",
];

/// Full synthesis payload: instructions, optional repair context, then the request
pub fn build_synthesis_prompt(schema_json: &str, request: &str, repair: Option<&RepairHint>) -> String {
    let mut prompt = SYNTHESIS_SYSTEM_PROMPT.replace("{schema}", schema_json);

    if let Some(hint) = repair {
        prompt.push_str(&build_repair_section(hint));
    }

    prompt.push_str(&format!("\nGenerate an SQL query to {}", request.trim()));
    prompt
}

fn build_repair_section(hint: &RepairHint) -> String {
    let mut section = format!(
        "\n## Previous attempt failed\n\nThe statement\n\n{}\n\nwas rejected by the database with: {}\n",
        hint.previous_sql, hint.diagnostic
    );
    if !hint.suggestions.is_empty() {
        section.push_str(&format!(
            "Names in the schema that may have been meant: {}\n",
            hint.suggestions.iter().join(", ")
        ));
    }
    section.push_str("Write a corrected statement. Keep the same reply format.\n");
    section
}

/// Instructions for the prose answer. Filled in one pass, so text inside the request or
/// the rows is never read back as a placeholder.
pub fn build_summary_prompt(
    request: &str,
    sql: &str,
    results_json: &str,
    schema_json: &str,
    row_limit: u64,
) -> String {
    format!(
        r#"You are given the results of a database lookup that was made to answer a user's question.

### The user asked:
"{request}"

### This statement was run to answer it:
"{sql}"

### Results:
{results_json}

### Database structure and example records:
{schema_json}

The statement was generated automatically from the user's question. The results may be cut off after the first {row_limit} rows.

Task: answer the user's question from these results in a single paragraph of fewer than 200 words. Relate the findings to what the user asked for and to the company's data. Talk about the company, its employees, departments and whatever else the user is looking for. Do not use technical words such as SQL, query, table, column, row or database.
"#,
        request = request.trim(),
    )
}
