//! Mermaid rendering of a compiled graph
//!
//! Static edges are solid arrows, declared routes are dashed arrows, and
//! interruptible nodes are drawn as hexagons:
//!
//! ```text
//! graph TD
//!     START((START))
//!     END((END))
//!     router["router"]
//!     confirm{{"confirm"}}
//!     START --> router
//!     router -.-> confirm
//!     router -.-> END
//! ```

use crate::compiled::CompiledGraph;
use crate::graph::{END, START};

impl CompiledGraph {
    /// Render the graph as a Mermaid flowchart
    pub fn to_mermaid(&self) -> String {
        let mut output = String::from("graph TD\n");

        output.push_str(&format!("    {}((START))\n", sanitize_id(START)));
        output.push_str(&format!("    {}((END))\n", sanitize_id(END)));

        for id in self.node_ids() {
            let (open, close) = if self.is_interruptible(id) {
                ("{{", "}}")
            } else {
                ("[", "]")
            };
            output.push_str(&format!(
                "    {}{}\"{}\"{}\n",
                sanitize_id(id),
                open,
                escape_mermaid(id),
                close
            ));
        }

        for (from, to) in self.edges() {
            output.push_str(&format!("    {} --> {}\n", sanitize_id(from), sanitize_id(to)));
        }

        for id in self.node_ids() {
            for target in self.routes(id).unwrap_or(&[]) {
                output.push_str(&format!(
                    "    {} -.-> {}\n",
                    sanitize_id(id),
                    sanitize_id(target)
                ));
            }
        }

        output
    }
}

fn escape_mermaid(s: &str) -> String {
    s.replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Mermaid ids must be alphanumeric plus underscore; lowercase `end` is a keyword
fn sanitize_id(s: &str) -> String {
    if s == START {
        return "START".to_string();
    }
    if s == END {
        return "END".to_string();
    }
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
