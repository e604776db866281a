//! 纯字符串层面的路径处理，不访问磁盘

pub trait Path: ToOwned {
    fn is_absolute(&self) -> bool;

    fn is_relative(&self) -> bool {
        !self.is_absolute()
    }

    /// 返回不以`/`结束、不包含相对项的绝对路径。
    ///
    /// 逐项压栈，遇`..`出栈（根目录的`..`仍是根目录），忽略`.`与空项。
    ///
    /// # 参数
    ///
    /// `cwd`: 当前工作目录，为绝对路径。
    fn canonicalize(&self, cwd: &Self) -> Self::Owned;

    /// 返回路径的`(父目录, 文件名)`，按字面拆分，忽略末尾的`/`。
    ///
    /// 相对路径只有一项时父目录为`"."`；根目录与空路径返回`None`。
    fn parent_file(&self) -> Option<(&Self, &Self)>;

    /// 非空且不是`.`的各项
    fn components(&self) -> impl Iterator<Item = &Self>;
}

impl Path for str {
    #[inline]
    fn is_absolute(&self) -> bool {
        self.starts_with('/')
    }

    fn canonicalize(&self, cwd: &Self) -> String {
        let mut cmps = Vec::new();
        if self.is_relative() {
            cmps.extend(cwd.components());
        }

        for cmp in self.components() {
            if cmp == ".." {
                cmps.pop();
            } else {
                cmps.push(cmp);
            }
        }

        format!("/{}", cmps.join("/"))
    }

    fn parent_file(&self) -> Option<(&Self, &Self)> {
        let trimmed = self.trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }

        Some(match trimmed.rsplit_once('/') {
            Some(("", file)) => ("/", file),
            Some((parent, file)) => (parent, file),
            None => (".", trimmed),
        })
    }

    fn components(&self) -> impl Iterator<Item = &Self> {
        self.split('/').filter(|cmp| !cmp.is_empty() && *cmp != ".")
    }
}
