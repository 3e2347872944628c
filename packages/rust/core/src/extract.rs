//! Submission intake: zip extraction and student-folder identification.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zip::ZipArchive;

use sheetgrader_shared::{Result, SheetGraderError, Submission, SubmissionStatus};
use sheetgrader_workbook::WORKBOOK_EXT;

/// Extract a submission zip into `dest`. A file that is not a readable zip
/// is an [`SheetGraderError::Archive`] error; entries whose names escape the
/// destination are skipped with a warning.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let file =
        std::fs::File::open(archive_path).map_err(|e| SheetGraderError::io(archive_path, e))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| SheetGraderError::Archive(format!("{}: {e}", archive_path.display())))?;

    std::fs::create_dir_all(dest).map_err(|e| SheetGraderError::io(dest, e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| SheetGraderError::Archive(format!("entry {i}: {e}")))?;

        let Some(rel) = entry.enclosed_name() else {
            warn!(name = entry.name(), "skipping archive entry with unsafe path");
            continue;
        };
        let out_path = dest.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| SheetGraderError::io(&out_path, e))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SheetGraderError::io(parent, e))?;
        }
        let mut out_file =
            std::fs::File::create(&out_path).map_err(|e| SheetGraderError::io(&out_path, e))?;
        std::io::copy(&mut entry, &mut out_file)
            .map_err(|e| SheetGraderError::io(&out_path, e))?;
    }

    debug!(archive = %archive_path.display(), dest = %dest.display(), "archive extracted");
    Ok(())
}

/// Identify one submission per student folder under the extraction root.
/// Hidden and packaging directories (`__MACOSX`, dotfiles) are ignored.
pub fn discover_submissions(extracted_root: &Path) -> Result<Vec<Submission>> {
    let root = effective_root(extracted_root)?;
    let mut submissions = Vec::new();

    let entries = std::fs::read_dir(&root).map_err(|e| SheetGraderError::io(&root, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| SheetGraderError::io(&root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if is_system_dir(name) {
            continue;
        }

        let student_key = clean_student_key(name);
        if student_key.is_empty() {
            warn!(folder = name, "folder name yields no student key, skipping");
            continue;
        }
        submissions.push(Submission {
            student_key,
            folder_name: name.to_string(),
            source_path: path,
            status: SubmissionStatus::Pending,
            failure: None,
        });
    }

    Ok(submissions)
}

/// Derive a `First_Last` key from a submission folder name.
///
/// Separators may be spaces or underscores. Numeric ID tokens and `(dup)`
/// markers are dropped, consecutive duplicate tokens collapse, and the key
/// keeps the first and last surviving tokens (a single token stands alone).
pub fn clean_student_key(folder_name: &str) -> String {
    let mut tokens: Vec<&str> = Vec::new();
    for raw in folder_name.split([' ', '_']) {
        let token = raw.trim().trim_matches(|c| c == '(' || c == ')');
        if token.is_empty() || token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if token.eq_ignore_ascii_case("dup") {
            continue;
        }
        if tokens.last().is_some_and(|prev| prev.eq_ignore_ascii_case(token)) {
            continue;
        }
        tokens.push(token);
    }

    match tokens.as_slice() {
        [] => String::new(),
        [only] => (*only).to_string(),
        [first, .., last] => format!("{first}_{last}"),
    }
}

/// Locate the student's workbook file within their folder. Students
/// sometimes nest their work one or two directories deep.
pub fn find_workbook(folder: &Path) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = Vec::new();
    collect_workbooks(folder, 0, &mut found);
    found.sort();
    found.into_iter().next()
}

fn collect_workbooks(dir: &Path, depth: usize, found: &mut Vec<PathBuf>) {
    if depth > 2 {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            if !is_system_dir(&name) {
                collect_workbooks(&path, depth + 1, found);
            }
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(WORKBOOK_EXT))
        {
            found.push(path);
        }
    }
}

/// Bulk-download zips often wrap everything in one top-level directory;
/// descend through single-directory levels until student folders appear.
fn effective_root(root: &Path) -> Result<PathBuf> {
    let mut current = root.to_path_buf();
    for _ in 0..3 {
        let mut dirs = Vec::new();
        let mut has_files = false;

        let entries = std::fs::read_dir(&current).map_err(|e| SheetGraderError::io(&current, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| SheetGraderError::io(&current, e))?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if path.is_dir() {
                if !is_system_dir(&name) {
                    dirs.push(path);
                }
            } else if !name.starts_with('.') {
                has_files = true;
            }
        }

        if dirs.len() == 1 && !has_files {
            current = dirs.remove(0);
        } else {
            break;
        }
    }
    Ok(current)
}

fn is_system_dir(name: &str) -> bool {
    name == "__MACOSX" || name.starts_with('.')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
