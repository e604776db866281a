//! Host-side helpers behind the `myfs` binary.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use myfs::{DirectoryTree, Error, FileStat, InodeKind, Listing, Perm, Result};

/// Copies every regular file directly under `host_dir` into the volume
/// directory `to`, overwriting files that already exist there.
///
/// Returns the names that were written. One failing file aborts the import.
pub fn import_dir(tree: &mut DirectoryTree, host_dir: &Path, to: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(host_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => log::warn!("skipping non-UTF-8 name {name:?}"),
        }
    }
    names.sort();

    let dir = to.trim_end_matches('/');
    for name in &names {
        let mut data = Vec::new();
        File::open(host_dir.join(name))?.read_to_end(&mut data)?;

        let path = format!("{dir}/{name}");
        match tree.create_file(&path, &data) {
            Err(Error::AlreadyExists(_)) => tree.write_file(&path, &data)?,
            other => {
                other?;
            }
        }
        log::info!("imported {name} ({} bytes) -> {path}", data.len());
    }

    Ok(names)
}

/// `-` reads stdin
pub fn read_source(source: &str) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    if source == "-" {
        io::stdin().read_to_end(&mut data)?;
    } else {
        File::open(source)?.read_to_end(&mut data)?;
    }

    Ok(data)
}

fn kind_char(kind: InodeKind) -> char {
    match kind {
        InodeKind::Directory => 'd',
        InodeKind::Link => 'l',
        InodeKind::File | InodeKind::Free => '-',
    }
}

/// One `ls` line: `drwxrwx  2  0  0  4096  4  name`
pub fn format_listing(item: &Listing) -> String {
    format!(
        "{}{} {:>3} {:>5} {:>5} {:>10} {:>6}  {}",
        kind_char(item.kind),
        Perm::render(item.perms),
        item.links,
        item.uid,
        item.gid,
        item.size,
        item.inode,
        item.name,
    )
}

pub fn format_stat(stat: &FileStat) -> String {
    let blocks: Vec<String> = stat.direct.iter().map(u32::to_string).collect();
    let indirect: Vec<String> = stat.indirect_pointers.iter().map(u32::to_string).collect();

    [
        format!("path:     {}", stat.path),
        format!("inode:    {} ({:?})", stat.inode, stat.kind),
        format!(
            "mode:     {}{}  uid {}  gid {}",
            kind_char(stat.kind),
            Perm::render(stat.perms),
            stat.uid,
            stat.gid
        ),
        format!("size:     {} bytes, {} links", stat.size, stat.links),
        format!("open:     {}", stat.open),
        format!(
            "times:    created {} modified {} accessed {}",
            stat.created_at, stat.modified_at, stat.accessed_at
        ),
        format!("direct:   [{}]", blocks.join(", ")),
        match stat.indirect {
            Some(block) => format!("indirect: {block} -> [{}]", indirect.join(", ")),
            None => "indirect: none".to_string(),
        },
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use myfs::{FileSystem, FormatOptions};

    use super::*;

    fn tree(dir: &Path) -> DirectoryTree {
        let fs = FileSystem::format(dir.join("fs.img"), &FormatOptions::new(4, 4, "pw")).unwrap();
        DirectoryTree::new(fs)
    }

    #[test]
    fn import_copies_regular_files() {
        let host = tempfile::tempdir().unwrap();
        fs::write(host.path().join("b.bin"), [1u8, 2, 3]).unwrap();
        fs::write(host.path().join("a.txt"), "hello").unwrap();
        fs::create_dir(host.path().join("nested")).unwrap();

        let out = tempfile::tempdir().unwrap();
        let mut tree = tree(out.path());
        for result in tree.mkdir(&["/bin"]) {
            result.unwrap();
        }

        let names = import_dir(&mut tree, host.path(), "/bin/").unwrap();
        assert_eq!(names, ["a.txt", "b.bin"]);
        assert_eq!(tree.read_file("/bin/a.txt").unwrap(), b"hello");
        assert_eq!(tree.read_file("/bin/b.bin").unwrap(), [1, 2, 3]);
        assert!(tree.resolve("/bin/nested").is_err());

        // 再次导入时覆盖
        fs::write(host.path().join("a.txt"), "v2").unwrap();
        import_dir(&mut tree, host.path(), "/bin").unwrap();
        assert_eq!(tree.read_file("/bin/a.txt").unwrap(), b"v2");
    }

    #[test]
    fn listing_line() {
        let out = tempfile::tempdir().unwrap();
        let tree = tree(out.path());

        let items = tree.list("/").unwrap();
        let user = items.iter().find(|item| item.name == "user").unwrap();
        let line = format_listing(user);
        assert!(line.starts_with("drwxrwx"));
        assert!(line.ends_with("  user"));

        let stat = format_stat(&tree.stat("/user").unwrap());
        assert!(stat.contains("indirect: none"));
    }
}
