// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

/// Pretty-prints a SQL query for display: keywords uppercased, one clause
/// per line, the select list broken on commas, AND/OR indented under their
/// clause. Quoted literals pass through untouched.
pub fn format_sql(sql: &str) -> String {
    let chunks: Vec<String> = split_chunks(sql)
        .iter()
        .map(|chunk| uppercase_keywords(chunk))
        .collect();
    if chunks.is_empty() {
        return sql.trim().to_owned();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut depth = 0_usize;
    let mut in_select = false;
    let mut index = 0;
    while index < chunks.len() {
        let chunk = chunks[index].as_str();

        if depth == 0 {
            if let Some(width) = clause_width(&chunks, index) {
                let clause = chunks[index..index + width].join(" ");
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                in_select = clause == "SELECT";
                line.push_str(&clause);
                index += width;
                continue;
            }
            if chunk == "AND" || chunk == "OR" {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                line.push_str("  ");
                line.push_str(chunk);
                index += 1;
                continue;
            }
        }

        if !line.is_empty() && !line.ends_with(' ') {
            line.push(' ');
        }
        line.push_str(chunk);
        depth = paren_depth_after(chunk, depth);

        if in_select && depth == 0 && chunk.ends_with(',') {
            lines.push(std::mem::take(&mut line));
            line.push_str("  ");
        }
        index += 1;
    }
    if !line.trim().is_empty() {
        lines.push(line);
    }
    lines.join("\n")
}

// Clause keywords start a fresh line; two-word clauses are matched before
// their one-word prefixes ("ORDER" alone is just an identifier).
fn clause_width(chunks: &[String], index: usize) -> Option<usize> {
    let first = chunks[index].as_str();
    let second = chunks.get(index + 1).map(String::as_str);
    match (first, second) {
        ("ORDER" | "GROUP", Some("BY")) => Some(2),
        ("LEFT" | "RIGHT" | "INNER" | "CROSS" | "FULL", Some("JOIN")) => Some(2),
        ("UNION", Some("ALL")) => Some(2),
        (
            "SELECT" | "FROM" | "WHERE" | "HAVING" | "LIMIT" | "OFFSET" | "UNION" | "JOIN" | "ON",
            _,
        ) => Some(1),
        _ => None,
    }
}

// Whitespace-separated spans, except that a single-quoted literal (with ''
// escapes) never splits.
fn split_chunks(sql: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    for ch in sql.chars() {
        if in_quote {
            current.push(ch);
            if ch == '\'' {
                in_quote = false;
            }
            continue;
        }
        match ch {
            '\'' => {
                in_quote = true;
                current.push(ch);
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn uppercase_keywords(chunk: &str) -> String {
    let mut out = String::with_capacity(chunk.len());
    let mut word = String::new();
    let mut in_quote = false;
    for ch in chunk.chars() {
        if in_quote {
            out.push(ch);
            if ch == '\'' {
                in_quote = false;
            }
        } else if ch.is_ascii_alphanumeric() || ch == '_' {
            word.push(ch);
        } else {
            flush_word(&mut out, &mut word);
            out.push(ch);
            if ch == '\'' {
                in_quote = true;
            }
        }
    }
    flush_word(&mut out, &mut word);
    out
}

fn flush_word(out: &mut String, word: &mut String) {
    if word.is_empty() {
        return;
    }
    let upper = word.to_ascii_uppercase();
    if is_sql_keyword(&upper) {
        out.push_str(&upper);
    } else {
        out.push_str(word);
    }
    word.clear();
}

fn paren_depth_after(chunk: &str, mut depth: usize) -> usize {
    let mut in_quote = false;
    for ch in chunk.chars() {
        if in_quote {
            if ch == '\'' {
                in_quote = false;
            }
        } else {
            match ch {
                '\'' => in_quote = true,
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
    }
    depth
}

fn is_sql_keyword(word: &str) -> bool {
    matches!(
        word,
        "SELECT"
            | "DISTINCT"
            | "FROM"
            | "WHERE"
            | "AND"
            | "OR"
            | "NOT"
            | "IN"
            | "EXISTS"
            | "BETWEEN"
            | "LIKE"
            | "IS"
            | "NULL"
            | "AS"
            | "ON"
            | "JOIN"
            | "LEFT"
            | "RIGHT"
            | "INNER"
            | "CROSS"
            | "FULL"
            | "OUTER"
            | "ORDER"
            | "BY"
            | "ASC"
            | "DESC"
            | "GROUP"
            | "HAVING"
            | "LIMIT"
            | "OFFSET"
            | "UNION"
            | "ALL"
            | "INTERSECT"
            | "EXCEPT"
            | "CASE"
            | "WHEN"
            | "THEN"
            | "ELSE"
            | "END"
            | "COUNT"
            | "SUM"
            | "AVG"
            | "MIN"
            | "MAX"
            | "COALESCE"
            | "CAST"
            | "TRUE"
            | "FALSE"
    )
}

#[cfg(test)]
mod tests {
    use super::format_sql;

    #[test]
    fn single_column_select() {
        let got = format_sql("SELECT COUNT(*) FROM orders WHERE region IS NOT NULL");
        assert_eq!(got, "SELECT COUNT(*)\nFROM orders\nWHERE region IS NOT NULL");
    }

    #[test]
    fn select_list_breaks_on_commas() {
        let got =
            format_sql("SELECT month, SUM(total) AS total FROM orders GROUP BY month ORDER BY month");
        assert_eq!(
            got,
            "SELECT month,\n  SUM(total) AS total\nFROM orders\nGROUP BY month\nORDER BY month"
        );
    }

    #[test]
    fn keywords_uppercased_and_connectors_indented() {
        let got = format_sql(
            "select region, count(*) as orders from orders where status = 'shipped' and region is not null order by orders desc limit 5",
        );
        assert_eq!(
            got,
            "SELECT region,\n  COUNT(*) AS orders\nFROM orders\nWHERE status = 'shipped'\n  AND region IS NOT NULL\nORDER BY orders DESC\nLIMIT 5"
        );
    }

    #[test]
    fn join_clauses_start_new_lines() {
        let got = format_sql(
            "SELECT o.id, c.name FROM orders o LEFT JOIN customers c ON o.customer_id = c.id WHERE o.total > 100",
        );
        assert_eq!(
            got,
            "SELECT o.id,\n  c.name\nFROM orders o\nLEFT JOIN customers c\nON o.customer_id = c.id\nWHERE o.total > 100"
        );
    }

    #[test]
    fn quoted_strings_pass_through() {
        let got = format_sql("SELECT * FROM t WHERE name = 'from where and'");
        assert_eq!(got, "SELECT *\nFROM t\nWHERE name = 'from where and'");
    }

    #[test]
    fn parenthesized_subqueries_stay_inline() {
        let got = format_sql("SELECT x FROM (SELECT x, y FROM t WHERE y > 1) WHERE x < 3");
        assert_eq!(
            got,
            "SELECT x\nFROM (SELECT x, y FROM t WHERE y > 1)\nWHERE x < 3"
        );
    }

    #[test]
    fn blank_input_passes_through() {
        assert_eq!(format_sql("   "), "");
    }
}
