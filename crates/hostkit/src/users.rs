//! Local accounts from the passwd, group and shadow databases.
//!
//! Password hashes are handed to `chpasswd -e` on stdin and never placed on
//! a command line or in a log message.

use crate::classify::check;
use crate::process::SystemExecutor;
use converge::{HostError, ProcessExecutor, UserDirectory, UserEntry, UserSpec};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct LocalUsers {
    exec: SystemExecutor,
    timeout: Duration,
    passwd: PathBuf,
    group: PathBuf,
    shadow: PathBuf,
}

fn parse_passwd_line(line: &str) -> Option<UserEntry> {
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 7 {
        return None;
    }
    Some(UserEntry {
        name: fields[0].to_string(),
        uid: fields[2].parse().ok()?,
        gid: fields[3].parse().ok()?,
        comment: fields[4].split(',').next().unwrap_or_default().to_string(),
        home: PathBuf::from(fields[5]),
        shell: fields[6].to_string(),
    })
}

fn find_user(passwd: &str, name: &str) -> Option<UserEntry> {
    passwd
        .lines()
        .filter(|l| l.starts_with(&format!("{name}:")))
        .find_map(parse_passwd_line)
}

fn find_group(group: &str, name: &str) -> Option<u32> {
    group.lines().find_map(|line| {
        let mut fields = line.split(':');
        (fields.next()? == name).then_some(())?;
        fields.nth(1)?.parse().ok()
    })
}

/// The hash field, `None` for empty and locked-without-password markers
fn find_hash(shadow: &str, name: &str) -> Option<String> {
    shadow.lines().find_map(|line| {
        let mut fields = line.split(':');
        (fields.next()? == name).then_some(())?;
        let hash = fields.next()?;
        (!matches!(hash, "" | "!" | "!!" | "*" | "!*")).then(|| hash.to_string())
    })
}

/// `useradd`/`usermod` flags for the fields set in `spec`
fn account_args(spec: &UserSpec, creating: bool) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(uid) = spec.uid {
        args.extend(["-u".to_string(), uid.to_string()]);
    }
    if let Some(gid) = spec.gid {
        args.extend(["-g".to_string(), gid.to_string()]);
    }
    if let Some(home) = &spec.home {
        args.extend(["-d".to_string(), home.display().to_string()]);
        // usermod moves the old home only when asked
        if !creating && spec.manage_home {
            args.push("-m".to_string());
        }
    }
    if let Some(shell) = &spec.shell {
        args.extend(["-s".to_string(), shell.clone()]);
    }
    if let Some(comment) = &spec.comment {
        args.extend(["-c".to_string(), comment.clone()]);
    }
    if creating {
        args.push(if spec.manage_home { "-m" } else { "-M" }.to_string());
    }
    args.push(spec.name.clone());
    args
}

impl LocalUsers {
    pub fn new(timeout: Duration) -> Self {
        Self {
            exec: SystemExecutor,
            timeout,
            passwd: PathBuf::from("/etc/passwd"),
            group: PathBuf::from("/etc/group"),
            shadow: PathBuf::from("/etc/shadow"),
        }
    }

    pub fn with_paths(mut self, passwd: PathBuf, group: PathBuf, shadow: PathBuf) -> Self {
        self.passwd = passwd;
        self.group = group;
        self.shadow = shadow;
        self
    }

    fn read(path: &Path) -> Result<String, HostError> {
        std::fs::read_to_string(path).map_err(|e| HostError::io(path, e))
    }

    fn run(&self, program: &str, args: &[String], name: &str) -> Result<(), HostError> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec.run(program, &args, self.timeout)?;
        check(&format!("{program} {name}"), output, Some(&format!("user {name}"))).map(|_| ())
    }

    fn set_password(&self, name: &str, hash: &str) -> Result<(), HostError> {
        let input = format!("{name}:{hash}\n");
        let output = self
            .exec
            .run_with_input("chpasswd", &["-e"], input.as_bytes(), self.timeout)?;
        check("chpasswd -e", output, Some(&format!("user {name}"))).map(|_| ())
    }
}

impl UserDirectory for LocalUsers {
    fn lookup_user(&self, name: &str) -> Result<Option<UserEntry>, HostError> {
        Ok(find_user(&Self::read(&self.passwd)?, name))
    }

    fn lookup_group(&self, name: &str) -> Result<Option<u32>, HostError> {
        Ok(find_group(&Self::read(&self.group)?, name))
    }

    fn password_hash(&self, name: &str) -> Result<Option<String>, HostError> {
        Ok(find_hash(&Self::read(&self.shadow)?, name))
    }

    fn create_user(&self, spec: &UserSpec) -> Result<(), HostError> {
        self.run("useradd", &account_args(spec, true), &spec.name)?;
        if let Some(hash) = &spec.password_hash {
            self.set_password(&spec.name, hash)?;
        }
        Ok(())
    }

    fn modify_user(&self, spec: &UserSpec) -> Result<(), HostError> {
        let args = account_args(spec, false);
        // only the name: nothing but the password changes
        if args.len() > 1 {
            self.run("usermod", &args, &spec.name)?;
        }
        if let Some(hash) = &spec.password_hash {
            self.set_password(&spec.name, hash)?;
        }
        Ok(())
    }

    fn remove_user(&self, name: &str, remove_home: bool) -> Result<(), HostError> {
        let mut args = Vec::new();
        if remove_home {
            args.push("-r".to_string());
        }
        args.push(name.to_string());
        self.run("userdel", &args, name)
    }
}
