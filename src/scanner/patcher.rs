// File: ./src/scanner/patcher.rs
/*!
Minimal edits to checklist files.

Completion toggles are patched in place: exactly one byte (the flag inside
`- [ ]`) is written. Every other edit goes through [`rewrite_lines`], which
reads the file as lines, lets the caller mutate them, and writes back only
from the first changed line onward. Every line written is terminated with a
single `\n`.

Each operation opens the file, takes an exclusive `fs2` lock for its
duration and releases both when it returns.
*/
use crate::model::DueDate;
use crate::model::checklist::{ChecklistLine, FLAG_OFFSET};
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// An open, exclusively locked file. Unlocked on drop.
struct PatchHandle<'a> {
    path: &'a Path,
    file: File,
}

impl<'a> PatchHandle<'a> {
    fn open(path: &'a Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open {:?} for patching", path))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {:?}", path))?;
        Ok(Self { path, file })
    }

    fn read_all(&mut self) -> Result<String> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut content = String::new();
        self.file
            .read_to_string(&mut content)
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        Ok(content)
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file
            .write_all(bytes)
            .with_context(|| format!("Failed to write {:?}", self.path))?;
        Ok(())
    }

    fn truncate(&mut self, len: usize) -> Result<()> {
        self.file
            .set_len(len as u64)
            .with_context(|| format!("Failed to truncate {:?}", self.path))
    }

    fn finish(mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

impl Drop for PatchHandle<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Finds `line` again: at its recorded index if unchanged, else the first
/// line with the same raw text.
fn locate<S: AsRef<str>>(lines: &[S], line: &ChecklistLine) -> Option<usize> {
    if lines
        .get(line.line_index)
        .is_some_and(|l| l.as_ref() == line.raw)
    {
        return Some(line.line_index);
    }
    lines.iter().position(|l| l.as_ref() == line.raw)
}

fn not_found(path: &Path, line: &ChecklistLine) -> anyhow::Error {
    anyhow::anyhow!(
        "Line {:?} no longer present in {:?}; file changed during the pass",
        line.raw,
        path
    )
}

/// Sets the completion flag of `line` by overwriting one byte.
///
/// The byte offset is the summed length of all preceding lines (each plus
/// its newline) plus the flag's position in the marker. Returns the line as
/// it now reads. Nothing is written if the flag already matches.
pub fn toggle_completion(
    path: &Path,
    line: &ChecklistLine,
    completed: bool,
) -> Result<ChecklistLine> {
    let mut handle = PatchHandle::open(path)?;
    let content = handle.read_all()?;
    let lines: Vec<&str> = content.split('\n').collect();
    let index = locate(&lines, line).ok_or_else(|| not_found(path, line))?;

    let current = lines[index];
    let flag = if completed { b'x' } else { b' ' };
    let mut raw = current.as_bytes().to_vec();
    let already = match raw.get(FLAG_OFFSET) {
        Some(b'x') | Some(b'X') => completed,
        Some(b' ') => !completed,
        _ => anyhow::bail!("{:?} in {:?} is not a checklist line", current, path),
    };

    if !already {
        let offset: usize = lines[..index].iter().map(|l| l.len() + 1).sum::<usize>() + FLAG_OFFSET;
        handle.write_at(offset, &[flag])?;
        raw[FLAG_OFFSET] = flag;
    }
    handle.finish()?;

    Ok(ChecklistLine {
        completed,
        line_index: index,
        // only an ASCII byte was swapped
        raw: String::from_utf8(raw)?,
        ..line.clone()
    })
}

/// Reads the file as lines, applies `edit`, and writes back the changed tail.
///
/// Lines that are unchanged at the start of the file are not rewritten.
/// Returns false when `edit` left the content byte-identical.
pub fn rewrite_lines<F>(path: &Path, edit: F) -> Result<bool>
where
    F: FnOnce(&mut Vec<String>) -> Result<()>,
{
    let mut handle = PatchHandle::open(path)?;
    let content = handle.read_all()?;

    let terminated = content.ends_with('\n');
    let mut old: Vec<&str> = content.split('\n').collect();
    if terminated || content.is_empty() {
        old.pop();
    }

    let mut lines: Vec<String> = old.iter().map(|l| l.to_string()).collect();
    edit(&mut lines)?;

    let rendered: String = lines.iter().map(|l| format!("{}\n", l)).collect();
    if rendered == content {
        return Ok(false);
    }

    let mut prefix = old
        .iter()
        .zip(lines.iter())
        .take_while(|(a, b)| **a == b.as_str())
        .count();
    // An unterminated last line still needs its newline written.
    if !terminated && prefix == old.len() && prefix > 0 {
        prefix -= 1;
    }
    let offset: usize = old[..prefix].iter().map(|l| l.len() + 1).sum();

    handle.write_at(offset, &rendered.as_bytes()[offset..])?;
    handle.truncate(rendered.len())?;
    handle.finish()?;
    Ok(true)
}

/// Removes `line`, keeping every other line in order.
pub fn remove_line(path: &Path, line: &ChecklistLine) -> Result<()> {
    rewrite_lines(path, |lines| {
        let index = locate(lines.as_slice(), line).ok_or_else(|| not_found(path, line))?;
        lines.remove(index);
        Ok(())
    })?;
    Ok(())
}

/// Replaces the date suffix of `line` with the one for `due`, or drops it.
pub fn replace_date_suffix(
    path: &Path,
    line: &ChecklistLine,
    due: Option<&DueDate>,
) -> Result<ChecklistLine> {
    let mut raw = line.raw_without_suffix().to_string();
    if let Some(due) = due {
        raw.push_str(&due.to_suffix());
    }
    if line.raw.ends_with('\r') {
        raw.push('\r');
    }

    let mut index = line.line_index;
    rewrite_lines(path, |lines| {
        index = locate(lines.as_slice(), line).ok_or_else(|| not_found(path, line))?;
        lines[index] = raw.clone();
        Ok(())
    })?;

    Ok(ChecklistLine {
        due: due.copied(),
        line_index: index,
        raw,
        ..line.clone()
    })
}

/// Appends `new_line` at end of file.
///
/// When `header` is not in the file yet, a blank line, the header and
/// another blank line are appended first. An existing header is never
/// duplicated.
pub fn append_under_section(path: &Path, header: &str, new_line: &str) -> Result<()> {
    let header = header.trim();
    rewrite_lines(path, |lines| {
        if !lines.iter().any(|l| l.trim_end() == header) {
            lines.push(String::new());
            lines.push(header.to_string());
            lines.push(String::new());
        }
        lines.push(new_line.to_string());
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestContext;
    use crate::model::checklist::decode_document;
    use chrono::NaiveDate;
    use std::fs;
    use std::path::PathBuf;

    const HEADER: &str = "## Added in Reminders";

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    fn write(ctx: &TestContext, content: &str) -> PathBuf {
        let path = ctx.notes_dir().join("Home.todo.md");
        fs::write(&path, content).unwrap();
        path
    }

    fn line(path: &Path, text: &str) -> ChecklistLine {
        let content = fs::read_to_string(path).unwrap();
        decode_document(&content, reference())
            .into_iter()
            .find(|l| l.text == text)
            .unwrap()
    }

    #[test]
    fn test_toggle_changes_exactly_one_byte() {
        let ctx = TestContext::new();
        let original = "# Home ✓\n\nSome ünïcode text\n- [ ] Paint\n- [ ] Sweep\n";
        let path = write(&ctx, original);

        let updated = toggle_completion(&path, &line(&path, "Sweep"), true).unwrap();
        assert!(updated.completed);
        assert_eq!(updated.raw, "- [x] Sweep");

        let after = fs::read(&path).unwrap();
        let before = original.as_bytes();
        assert_eq!(after.len(), before.len());
        let diffs: Vec<_> = (0..after.len()).filter(|&i| after[i] != before[i]).collect();
        assert_eq!(diffs.len(), 1);
        assert_eq!(after[diffs[0]], b'x');

        toggle_completion(&path, &updated, false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_toggle_finds_moved_line() {
        let ctx = TestContext::new();
        let path = write(&ctx, "- [ ] Paint\n");
        let stale = line(&path, "Paint");
        fs::write(&path, "intro\n- [ ] Paint\n").unwrap();

        toggle_completion(&path, &stale, true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "intro\n- [x] Paint\n");
    }

    #[test]
    fn test_toggle_missing_line_is_error() {
        let ctx = TestContext::new();
        let path = write(&ctx, "- [ ] Paint\n");
        let stale = line(&path, "Paint");
        fs::write(&path, "- [ ] Sweep\n").unwrap();
        assert!(toggle_completion(&path, &stale, true).is_err());
    }

    #[test]
    fn test_remove_line_keeps_order_and_terminates_lines() {
        let ctx = TestContext::new();
        let path = write(&ctx, "# Home\n- [ ] Paint\n- [ ] Sweep\nlast");
        remove_line(&path, &line(&path, "Paint")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "# Home\n- [ ] Sweep\nlast\n");
    }

    #[test]
    fn test_rewrite_without_change_is_noop() {
        let ctx = TestContext::new();
        let path = write(&ctx, "a\nb\n");
        assert!(!rewrite_lines(&path, |_| Ok(())).unwrap());
        assert!(rewrite_lines(&write(&ctx, "a\nb"), |_| Ok(())).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb\n");
    }

    #[test]
    fn test_replace_date_suffix_changes_length() {
        let ctx = TestContext::new();
        let path = write(&ctx, "- [ ] Call mom – Saturday 12 Jul\n- [ ] Paint\n");
        let due = DueDate::At(
            NaiveDate::from_ymd_opt(2025, 7, 14)
                .unwrap()
                .and_hms_opt(21, 0, 0)
                .unwrap(),
        );
        let updated = replace_date_suffix(&path, &line(&path, "Call mom"), Some(&due)).unwrap();
        assert_eq!(updated.raw, "- [ ] Call mom – Monday 14 Jul at 9:00 PM");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "- [ ] Call mom – Monday 14 Jul at 9:00 PM\n- [ ] Paint\n"
        );

        replace_date_suffix(&path, &updated, None).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "- [ ] Call mom\n- [ ] Paint\n"
        );
    }

    #[test]
    fn test_append_creates_header_once() {
        let ctx = TestContext::new();
        let path = write(&ctx, "# Home\n- [ ] Paint\n");
        append_under_section(&path, HEADER, "- [ ] Sweep").unwrap();
        append_under_section(&path, HEADER, "- [ ] Mop").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# Home\n- [ ] Paint\n\n## Added in Reminders\n\n- [ ] Sweep\n- [ ] Mop\n"
        );
    }

    #[test]
    fn test_append_into_empty_file() {
        let ctx = TestContext::new();
        let path = write(&ctx, "");
        append_under_section(&path, HEADER, "- [ ] Sweep").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "\n## Added in Reminders\n\n- [ ] Sweep\n"
        );
    }

    #[test]
    fn test_append_goes_to_end_of_file() {
        let ctx = TestContext::new();
        let path = write(
            &ctx,
            "## Added in Reminders\n\n- [ ] Sweep\n\n## Later\n- [ ] Paint\n",
        );
        append_under_section(&path, HEADER, "- [ ] Mop").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "## Added in Reminders\n\n- [ ] Sweep\n\n## Later\n- [ ] Paint\n- [ ] Mop\n"
        );
    }

    #[test]
    fn test_append_after_bare_header() {
        let ctx = TestContext::new();
        let path = write(&ctx, "## Added in Reminders");
        append_under_section(&path, HEADER, "- [ ] Mop").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "## Added in Reminders\n- [ ] Mop\n"
        );
    }
}
