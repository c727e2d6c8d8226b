//! Parsing of `LIST` output.
//!
//! Handles the two formats servers actually send: Unix `ls -l` lines and
//! MS-DOS/IIS lines. Lines in neither format are skipped.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub size: u64,
    pub kind: EntryKind,
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Whitespace-separated fields with their byte offsets.
fn fields(line: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                out.push((s, &line[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, &line[s..]));
    }
    out
}

fn parse_unix(line: &str) -> Option<ListEntry> {
    let kind = match line.chars().next()? {
        '-' => EntryKind::File,
        'd' => EntryKind::Directory,
        'l' => EntryKind::Link,
        _ => return None,
    };
    let fields = fields(line);

    // Owner/group columns vary, so anchor on the month: size, month, day, time-or-year, name.
    let is_number = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let month_idx = (1..fields.len().saturating_sub(3)).find(|&i| {
        MONTHS.contains(&fields[i].1.to_ascii_lowercase().as_str())
            && is_number(fields[i - 1].1)
            && is_number(fields[i + 1].1)
    })?;
    let size = fields[month_idx - 1].1.parse().ok()?;
    let (name_offset, _) = *fields.get(month_idx + 3)?;

    let mut name = &line[name_offset..];
    if kind == EntryKind::Link {
        if let Some(arrow) = name.find(" -> ") {
            name = &name[..arrow];
        }
    }
    Some(ListEntry {
        name: name.to_string(),
        size,
        kind,
    })
}

fn parse_dos(line: &str) -> Option<ListEntry> {
    let fields = fields(line);
    if fields.len() < 4 {
        return None;
    }
    let date = fields[0].1;
    if !date.contains('-') && !date.contains('/') {
        return None;
    }
    if !date.bytes().next()?.is_ascii_digit() {
        return None;
    }
    let (kind, size) = if fields[2].1.eq_ignore_ascii_case("<DIR>") {
        (EntryKind::Directory, 0)
    } else {
        (EntryKind::File, fields[2].1.replace(',', "").parse().ok()?)
    };
    Some(ListEntry {
        name: line[fields[3].0..].to_string(),
        size,
        kind,
    })
}

/// Parse the full text of a `LIST` reply.
pub fn parse_listing(text: &str) -> Vec<ListEntry> {
    text.lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .filter_map(|l| parse_unix(l).or_else(|| parse_dos(l)))
        .collect()
}

/// Pick the entry describing `path` out of a listing of that path.
pub fn find_file<'a>(entries: &'a [ListEntry], path: &str, file_name: &str) -> Option<&'a ListEntry> {
    let trimmed = path.trim_start_matches('/');
    let mut files = entries.iter().filter(|e| e.kind != EntryKind::Directory);
    let matched = files.clone().find(|e| {
        let name = e.name.trim_start_matches('/');
        name == file_name || name == trimmed || name.ends_with(&format!("/{file_name}"))
    });
    matched.or_else(|| match (files.next(), files.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    })
}
