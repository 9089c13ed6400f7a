//! Bootstrap cloud-config translation
//!
//! A cloud-config document is lowered into primitive commands, which are then
//! rendered into one `sudo sh -c "..."` line a node agent can execute.
//!
//! Only the shapes below have a single-line rendering:
//! - `mkdir` / `chmod` with their arguments
//! - `/bin/sh -c <script>` without stdin
//! - `/bin/sh -c "cat > <path> /dev/stdin"` with stdin, rendered as `echo`

use crate::error::SouthboundError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use crds::{KUBEADM_CONFIG_KIND, RKE2_CONFIG_KIND};
use serde::Deserialize;

pub const SHELL: &str = "/bin/sh";

/// Directory RKE2 merges extra config files from
pub const RKE2_CONFIG_DIR: &str = "/etc/rancher/rke2/config.yaml.d/";

/// File carrying the kubelet provider id on RKE2 nodes
pub const RKE2_PROVIDER_ID_FILE: &str = "/etc/rancher/rke2/config.yaml.d/providerID.yaml";

pub const KUBEADM_UNINSTALL_COMMAND: &str =
    "sudo kubeadm reset --force && sudo rm -rf /etc/kubernetes /etc/cni/net.d /var/lib/etcd";

pub const RKE2_UNINSTALL_COMMAND: &str = "if [ -x /usr/local/bin/rke2-uninstall.sh ]; \
    then sudo /usr/local/bin/rke2-uninstall.sh; \
    else sudo /opt/rke2/bin/rke2-uninstall.sh; fi";

/// One primitive step of a bootstrap script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub cmd: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl Command {
    pub fn new(cmd: &str, args: &[&str]) -> Self {
        Self {
            cmd: cmd.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            stdin: None,
        }
    }

    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            cmd: SHELL.to_string(),
            args: vec!["-c".to_string(), script.into()],
            stdin: None,
        }
    }

    /// Write `content` to `path` through stdin
    pub fn write_file(path: &str, content: impl Into<String>) -> Self {
        Self {
            stdin: Some(content.into()),
            ..Self::shell(format!("cat > {} /dev/stdin", path))
        }
    }
}

/// Bootstrap providers with install support
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapProvider {
    Kubeadm,
    Rke2,
}

impl BootstrapProvider {
    pub fn from_kind(kind: &str) -> Result<Self, SouthboundError> {
        match kind {
            KUBEADM_CONFIG_KIND => Ok(Self::Kubeadm),
            RKE2_CONFIG_KIND => Ok(Self::Rke2),
            other => Err(SouthboundError::UnsupportedProvider(other.to_string())),
        }
    }

    /// Commands run before the bootstrap script
    pub fn prelude(&self, provider_id: &str) -> Vec<Command> {
        match self {
            Self::Kubeadm => Vec::new(),
            Self::Rke2 => vec![
                Command::new("mkdir", &["-p", RKE2_CONFIG_DIR]),
                Command::write_file(RKE2_PROVIDER_ID_FILE, format!("kubelet-arg+: [--provider-id={}]", provider_id)),
                Command::new("chmod", &["0640", RKE2_PROVIDER_ID_FILE]),
            ],
        }
    }

    pub fn uninstall_command(&self) -> &'static str {
        match self {
            Self::Kubeadm => KUBEADM_UNINSTALL_COMMAND,
            Self::Rke2 => RKE2_UNINSTALL_COMMAND,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CloudConfig {
    #[serde(default)]
    write_files: Vec<WriteFile>,
    #[serde(default)]
    runcmd: Vec<RunCommand>,
}

#[derive(Debug, Deserialize)]
struct WriteFile {
    path: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    permissions: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RunCommand {
    Script(String),
    Argv(Vec<String>),
}

impl WriteFile {
    fn decoded_content(&self) -> Result<String, SouthboundError> {
        match self.encoding.as_deref() {
            None | Some("text/plain") => Ok(self.content.clone()),
            Some("b64") | Some("base64") => {
                let bytes = STANDARD
                    .decode(self.content.trim())
                    .map_err(|e| SouthboundError::InvalidBootstrapPayload(format!("{}: {}", self.path, e)))?;
                String::from_utf8(bytes)
                    .map_err(|e| SouthboundError::InvalidBootstrapPayload(format!("{}: {}", self.path, e)))
            }
            Some(other) => Err(SouthboundError::InvalidBootstrapPayload(format!(
                "{}: unsupported encoding {}",
                self.path, other
            ))),
        }
    }
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => ".",
    }
}

/// Lower a cloud-config document into primitive commands, files first
pub fn parse(document: &str) -> Result<Vec<Command>, SouthboundError> {
    let config: CloudConfig = serde_yaml::from_str::<Option<CloudConfig>>(document)
        .map_err(|e| SouthboundError::InvalidBootstrapPayload(e.to_string()))?
        .unwrap_or_default();

    let mut commands = Vec::new();
    for file in &config.write_files {
        commands.push(Command::new("mkdir", &["-p", parent_dir(&file.path)]));
        commands.push(Command::write_file(&file.path, file.decoded_content()?));
        if let Some(permissions) = file.permissions.as_deref() {
            commands.push(Command::new("chmod", &[permissions, &file.path]));
        }
    }
    for run in config.runcmd {
        let script = match run {
            RunCommand::Script(script) => script,
            RunCommand::Argv(argv) => argv.join(" "),
        };
        commands.push(Command::shell(script));
    }
    Ok(commands)
}

fn render_one(command: &Command) -> Result<String, SouthboundError> {
    let stdin = command.stdin.as_deref().filter(|s| !s.is_empty());
    match (command.cmd.as_str(), command.args.as_slice(), stdin) {
        ("mkdir" | "chmod", args, None) => Ok(format!("{} {}", command.cmd, args.join(" "))),
        (SHELL, [flag, script], None) if flag == "-c" => Ok(script.clone()),
        (SHELL, [flag, script], Some(stdin)) if flag == "-c" => {
            let path = script
                .strip_prefix("cat > ")
                .and_then(|rest| rest.strip_suffix(" /dev/stdin"))
                .filter(|path| !path.is_empty())
                .ok_or_else(|| SouthboundError::CommandParse(format!("unexpected stdin for {:?}", script)))?;
            Ok(format!("echo '{}' > {}", stdin, path))
        }
        _ => Err(SouthboundError::CommandParse(format!("{} {}", command.cmd, command.args.join(" ")))),
    }
}

/// Render commands into one privileged shell line
pub fn render(commands: &[Command]) -> Result<String, SouthboundError> {
    let rendered = commands.iter().map(render_one).collect::<Result<Vec<_>, _>>()?;
    Ok(format!("sudo sh -c \"{}\"", rendered.join("; ")))
}

/// Install command for a node: provider prelude followed by the bootstrap script
pub fn install_command(
    provider: BootstrapProvider,
    provider_id: &str,
    document: &str,
) -> Result<String, SouthboundError> {
    let mut commands = provider.prelude(provider_id);
    commands.extend(parse(document)?);
    render(&commands)
}
