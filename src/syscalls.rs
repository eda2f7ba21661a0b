//! Recognized syscall allow-list
//!
//! Only syscalls listed here are accepted by the decoder. They fall into
//! three classes: file-touching operations that can produce a dependency or
//! an output, process lifecycle operations that shape the process tree, and
//! syscalls strace emits under `-etrace=file,process` that carry nothing we
//! attribute but must not be reported as unmatched noise.

/// Informational class of a recognized syscall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallClass {
    File,
    Process,
    Unused,
}

/// Classify a syscall name, or `None` if it is not recognized
pub fn classify_syscall(name: &str) -> Option<SyscallClass> {
    match name {
        "open" | "openat" | "creat" | "link" | "linkat" | "symlink" | "symlinkat" | "rename"
        | "renameat" | "renameat2" | "chdir" => Some(SyscallClass::File),

        "clone" | "clone3" | "fork" | "vfork" | "execve" => Some(SyscallClass::Process),

        "chown" | "chown32" | "lchown" | "lchown32" | "fchownat" | "getxattr" | "setxattr"
        | "lgetxattr" | "lsetxattr" | "fchmodat" | "chmod" | "rmdir" | "mkdir" | "mkdirat"
        | "unlink" | "unlinkat" | "utime" | "utimes" | "utimensat" | "futimesat" | "getcwd"
        | "statfs" | "statfs64" | "stat" | "stat64" | "lstat" | "lstat64" | "newfstatat"
        | "fstatat64" | "statx" | "access" | "faccessat" | "faccessat2" | "readlink"
        | "readlinkat" | "truncate" | "mknod" | "mknodat" | "exit" | "exit_group" | "waitpid"
        | "wait4" | "waitid" | "arch_prctl" | "execveat" | "kill" | "tkill" | "tgkill"
        | "umount2" | "mount" | "chroot" | "swapon" | "swapoff" | "inotify_add_watch"
        | "fanotify_mark" | "name_to_handle_at" | "listxattr" | "llistxattr"
        | "removexattr" | "lremovexattr" | "quotactl" | "acct" | "pivot_root" => {
            Some(SyscallClass::Unused)
        }

        _ => None,
    }
}

/// Syscalls that create a new process and return the child pid
pub fn is_fork(name: &str) -> bool {
    matches!(name, "clone" | "clone3" | "fork" | "vfork")
}
