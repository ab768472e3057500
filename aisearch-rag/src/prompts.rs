//! Prompt templates.
//!
//! Templates use `{name}` placeholders filled by [`render`]. Braces that do not
//! enclose a known variable name are left untouched, so JSON examples inside a
//! template need no escaping.

/// Fill `{name}` placeholders in a single pass. Substituted values are never
/// re-scanned.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (close, *v))
        });
        match replaced {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

pub const TEXT_QA: &str = "Context information is below.
---------------------
{context_str}
---------------------
Given the context information and not prior knowledge, answer the query.
Query: {query_str}
Answer: ";

pub const REFINE: &str = "The original query is as follows: {query_str}
We have provided an existing answer: {existing_answer}
We have the opportunity to refine the existing answer (only if needed) with some more context below.
------------
{context_msg}
------------
Given the new context, refine the original answer to better answer the query. If the context isn't useful, return the original answer.
Refined Answer: ";

pub const TREE_SUMMARIZE: &str = "Context information from multiple sources is below.
---------------------
{context_str}
---------------------
Given the information from multiple sources and not prior knowledge, answer the query.
Query: {query_str}
Answer: ";

pub const SUMMARY_ONLY: &str = "Write a summary of the following. Try to use only the information provided. Try to include as many key details as possible.

{context_str}

SUMMARY: ";

pub const KG_TRIPLET_EXTRACT: &str = "Some text is provided below. Given the text, extract up to {max_knowledge_triplets} knowledge triplets in the form of (subject, predicate, object). Avoid stopwords.
---------------------
Example:
Text: Alice is Bob's mother.
Triplets:
(Alice, is mother of, Bob)
Text: Philz is a coffee shop founded in Berkeley in 1982.
Triplets:
(Philz, is, coffee shop)
(Philz, founded in, Berkeley)
(Philz, founded in, 1982)
---------------------
Text: {text}
Triplets:
";

pub const QUERY_KEYWORD_EXTRACT: &str = "A question is provided below. Given the question, extract up to {max_keywords} keywords from the text. Focus on extracting the keywords that we can use to best lookup answers to the question. Avoid stopwords.
---------------------
{question}
---------------------
Provide keywords in the following comma-separated format: 'KEYWORDS: <keywords>'
";

pub const CHOICE_SELECT: &str = "A list of documents is shown below. Each document has a number next to it along with a summary of the document. A question is also provided.
Respond with the numbers of the documents you should consult to answer the question, in order of relevance, as well as the relevance score. The relevance score is a number from 1-10 based on how relevant you think the document is to the question.
Do not include any documents that are not relevant to the question.
Example format:
Document 1:
<summary of document 1>

Document 2:
<summary of document 2>

...

Document 10:
<summary of document 10>

Question: <question>
Answer:
Doc: 9, Relevance: 7
Doc: 3, Relevance: 4
Doc: 7, Relevance: 3

Let's try this now:

{context_str}
Question: {query_str}
Answer:
";

pub const FAITHFULNESS_EVAL: &str = "Please tell if a given piece of information is supported by the context.
You need to answer with either YES or NO.
Answer YES if any of the context supports the information, even if most of the context is unrelated. Some examples are provided below.

Information: Apple pie is generally double-crusted.
Context: An apple pie is a fruit pie in which the principal filling ingredient is apples.
Apple pie is often served with whipped cream, ice cream ('apple pie a la mode'), custard or cheddar cheese.
It is generally double-crusted, with pastry both above and below the filling; the upper crust may be solid or latticed (woven of crosswise strips).
Answer: YES
Information: Apple pies tastes bad.
Context: An apple pie is a fruit pie in which the principal filling ingredient is apples.
Apple pie is often served with whipped cream, ice cream ('apple pie a la mode'), custard or cheddar cheese.
It is generally double-crusted, with pastry both above and below the filling; the upper crust may be solid or latticed (woven of crosswise strips).
Answer: NO
Information: {query_str}
Context: {context_str}
Answer: ";

pub const FAITHFULNESS_REFINE: &str = "We want to understand if the following information is present in the context information: {query_str}
We have provided an existing YES/NO answer: {existing_answer}
We have the opportunity to refine the existing answer (only if needed) with some more context below.
------------
{context_msg}
------------
If the existing answer was already YES, still answer YES. If the information is present in the new context, answer YES. Otherwise answer NO.
";

pub const RELEVANCY_EVAL: &str = "Your task is to evaluate if the response for the query is in line with the context information provided.
You have two options to answer. Either YES/ NO.
Answer - YES, if the response for the query is in line with context information otherwise NO.
Query and Response:
 {query_str}
Context:
 {context_str}
Answer: ";

pub const RELEVANCY_REFINE: &str = "We want to understand if the following query and response is in line with the context information:
 {query_str}
We have provided an existing YES/NO answer:
 {existing_answer}
We have the opportunity to refine the existing answer (only if needed) with some more context below.
------------
{context_msg}
------------
If the existing answer was already YES, still answer YES. If the information is present in the new context, answer YES. Otherwise answer NO.
";

pub const TITLE_NODE: &str = "Context: {context_str}. Give a title that summarizes all of the unique entities, titles or themes found in the context. Title: ";

pub const TITLE_COMBINE: &str = "{context_str}. Based on the above candidate titles and content, what is the comprehensive title for this document? Title: ";

pub const QUESTIONS_ANSWERED: &str = "Here is the context:
{context_str}

Given the contextual information, generate {num_questions} questions this context can provide specific answers to which are unlikely to be found elsewhere.

Higher-level summaries of surrounding context may be provided as well. Try using these summaries to generate better questions that this context can answer.

";

pub const SECTION_SUMMARY: &str = "Here is the content of the section:
{context_str}

Summarize the key topics and entities of the section.
Summary: ";

pub const KEYWORDS: &str = "{context_str}. Give {keywords} unique keywords for this document. Format as comma separated. Keywords: ";

pub const ENTITIES: &str = "Extract the named entities (people, organizations, locations, products, dates, monetary values) mentioned in the text below.
Respond only with a JSON array of objects with the fields \"entity\", \"type\" and \"confidence\", where confidence is a number between 0 and 1.
---------------------
{context_str}
---------------------
Entities: ";

pub const SUB_QUESTION: &str = r#"Given a user question, and a list of tools, output a list of relevant sub-questions in json markdown that when composed can help answer the full user question:

# Example 1
<Tools>
```json
{
    "uber_10k": "Provides information about Uber financials for year 2021",
    "lyft_10k": "Provides information about Lyft financials for year 2021"
}
```

<User Question>
Compare and contrast the revenue growth and EBITDA of Uber and Lyft for year 2021


<Output>
```json
{
    "items": [
        {
            "sub_question": "What is the revenue growth of Uber",
            "tool_name": "uber_10k"
        },
        {
            "sub_question": "What is the EBITDA of Uber",
            "tool_name": "uber_10k"
        },
        {
            "sub_question": "What is the revenue growth of Lyft",
            "tool_name": "lyft_10k"
        },
        {
            "sub_question": "What is the EBITDA of Lyft",
            "tool_name": "lyft_10k"
        }
    ]
}
```

# Example 2
<Tools>
```json
{tools_str}
```

<User Question>
{query_str}

<Output>
"#;

pub const REACT_HEADER: &str = r#"You are designed to help with a variety of tasks, from answering questions to providing summaries to other types of analyses.

## Tools

You have access to a wide variety of tools. You are responsible for using the tools in any sequence you deem appropriate to complete the task at hand.
This may require breaking the task into subtasks and using different tools to complete each subtask.

You have access to the following tools:
{tool_desc}


## Output Format

Please answer in the same language as the question and use the following format:

```
Thought: I need to use a tool to help me answer the question.
Action: tool name (one of {tool_names}) if using a tool.
Action Input: the input to the tool, in a JSON format representing the kwargs (e.g. {"input": "hello world"})
```

Please ALWAYS start with a Thought.

Please use a valid JSON format for the Action Input. Do NOT do this {'input': 'hello world'}.

If this format is used, you will receive a message in the following format:

```
Observation: tool response
```

You should keep repeating the above format until you have enough information to answer the question without using any more tools. At that point, you MUST respond in one of the following two formats:

```
Thought: I can answer without using any more tools.
Answer: [your answer here]
```

```
Thought: I cannot answer the question with the provided tools.
Answer: [your answer here]
```

## Current Conversation

Below is the current conversation consisting of interleaving human and assistant messages.
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_known_vars_only() {
        let out = render(
            "Q: {query_str} {\"json\": 1} {unknown}",
            &[("query_str", "why?")],
        );
        assert_eq!(out, "Q: why? {\"json\": 1} {unknown}");
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let out = render(
            "{a}-{b}",
            &[("a", "{b}"), ("b", "x")],
        );
        assert_eq!(out, "{b}-x");
    }

    #[test]
    fn test_sub_question_template_keeps_example_json() {
        let out = render(SUB_QUESTION, &[("tools_str", "{}"), ("query_str", "q")]);
        assert!(out.contains("\"tool_name\": \"uber_10k\""));
        assert!(out.ends_with("<User Question>\nq\n\n<Output>\n"));
    }
}
