//! Console output for pipeline runs.

use aisearch_rag::{EvaluationResult, MetadataMode, Node, NodeWithScore, Response};

pub const RULE: &str = "==================================================";
pub const SEPARATOR: &str = "--------------------------------------------------";

fn or_none<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "None".to_string())
}

pub fn evaluation_result(result: &EvaluationResult) -> String {
    format!(
        "Passing : {}\nFeedback : {}\nScore : {}\nPairwise source : {}\nInvalid result : {}\nInvalid reason : {}",
        or_none(&result.passing),
        or_none(&result.feedback),
        or_none(&result.score),
        or_none(&result.pairwise_source),
        result.invalid_result,
        or_none(&result.invalid_reason),
    )
}

pub fn node(node: &NodeWithScore) -> String {
    format!(
        "Node ID  : {}\nScore    : {}\nText     : {}",
        node.id(),
        or_none(&node.score),
        node.text()
    )
}

pub fn chunks(nodes: &[Node]) -> String {
    let mut out = String::from("Chunks ->\n");
    for node in nodes {
        out.push('\n');
        out.push_str(&node.get_content(MetadataMode::None));
        out.push('\n');
    }
    out
}

pub fn print_evaluation(label: &str, result: &EvaluationResult) {
    println!("{} ->", label);
    println!("{}", evaluation_result(result));
}

pub fn print_answer(question: &str, response: &Response) {
    println!("Q : {}", question);
    println!("A : {}", response);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_evaluation_result_lines() {
        let result = EvaluationResult {
            passing: Some(true),
            feedback: Some("YES".into()),
            score: Some(1.0),
            ..Default::default()
        };
        assert_eq!(
            evaluation_result(&result),
            "Passing : true\nFeedback : YES\nScore : 1\nPairwise source : None\nInvalid result : false\nInvalid reason : None"
        );
    }

    #[test]
    fn test_node_line() {
        let scored = NodeWithScore::new(Node::new("Viaweb").with_id("n1"), None);
        assert_eq!(node(&scored), "Node ID  : n1\nScore    : None\nText     : Viaweb");
    }

    #[test]
    fn test_chunks_hide_metadata() {
        let nodes = vec![Node::new("first").with_metadata("file_name", "a.txt"), Node::new("second")];
        assert_eq!(chunks(&nodes), "Chunks ->\n\nfirst\n\nsecond\n");
    }
}
