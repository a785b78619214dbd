//! Outbound requests
//!
//! Each request is one JSON object on one line, discriminated by `command`.

use serde::Serialize;

use super::decode::ResponseKind;

/// Characters accepted between filter entries: `"*.cpp;*.h | *.hpp"`
const FILTER_SEPARATORS: &[char] = &[',', ';', ' ', '|'];

/// Environment entry for `exec`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command")]
pub enum Request {
    #[serde(rename = "ls")]
    ListFiles {
        root_dir: String,
        file_extensions: Vec<String>,
        exclude_extensions: Vec<String>,
        exclude_patterns: Vec<String>,
    },
    #[serde(rename = "find")]
    Find {
        root_dir: String,
        find_what: String,
        file_extensions: Vec<String>,
        exclude_patterns: Vec<String>,
        icase: bool,
        whole_word: bool,
    },
    #[serde(rename = "replace")]
    Replace {
        root_dir: String,
        find_what: String,
        replace_with: String,
        file_extensions: Vec<String>,
        exclude_patterns: Vec<String>,
        icase: bool,
        whole_word: bool,
    },
    #[serde(rename = "locate")]
    Locate {
        path: String,
        name: String,
        ext: String,
        versions: Vec<String>,
    },
    #[serde(rename = "find_path")]
    FindPath { path: String },
    #[serde(rename = "list_lsps")]
    ListLsps,
    #[serde(rename = "exec")]
    Exec {
        wd: String,
        cmd: String,
        env: Vec<EnvEntry>,
    },
}

/// Parameters for a find-in-files request
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub root_dir: String,
    /// Delimited list, e.g. `"*.cpp;*.h"`
    pub extensions: String,
    pub exclude_patterns: String,
    pub find_what: String,
    pub whole_word: bool,
    pub icase: bool,
}

/// Parameters for a replace-in-files request
#[derive(Debug, Clone, Default)]
pub struct ReplaceParams {
    pub search: SearchParams,
    pub replace_with: String,
}

impl Request {
    pub fn list_files(
        root_dir: &str,
        extensions: &str,
        exclude_extensions: &str,
        exclude_patterns: &str,
    ) -> Self {
        Request::ListFiles {
            root_dir: root_dir.to_string(),
            file_extensions: tokenize_filters(extensions),
            exclude_extensions: tokenize_filters(exclude_extensions),
            exclude_patterns: tokenize_filters(exclude_patterns),
        }
    }

    pub fn find(params: &SearchParams) -> Self {
        Request::Find {
            root_dir: params.root_dir.clone(),
            find_what: params.find_what.clone(),
            file_extensions: tokenize_filters(&params.extensions),
            exclude_patterns: tokenize_filters(&params.exclude_patterns),
            icase: params.icase,
            whole_word: params.whole_word,
        }
    }

    pub fn replace(params: &ReplaceParams) -> Self {
        let search = &params.search;
        Request::Replace {
            root_dir: search.root_dir.clone(),
            find_what: search.find_what.clone(),
            replace_with: params.replace_with.clone(),
            file_extensions: tokenize_filters(&search.extensions),
            exclude_patterns: tokenize_filters(&search.exclude_patterns),
            icase: search.icase,
            whole_word: search.whole_word,
        }
    }

    pub fn locate(path: &str, name: &str, ext: &str, versions: &[String]) -> Self {
        Request::Locate {
            path: path.to_string(),
            name: name.to_string(),
            ext: ext.to_string(),
            versions: versions.to_vec(),
        }
    }

    pub fn find_path(path: &str) -> Self {
        Request::FindPath {
            path: path.to_string(),
        }
    }

    pub fn exec(cmd: &str, wd: &str, env: &[(String, String)]) -> Self {
        Request::Exec {
            wd: wd.to_string(),
            cmd: cmd.to_string(),
            env: env
                .iter()
                .map(|(name, value)| EnvEntry {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    /// Value of the `command` discriminator
    pub fn command_name(&self) -> &'static str {
        match self {
            Request::ListFiles { .. } => "ls",
            Request::Find { .. } => "find",
            Request::Replace { .. } => "replace",
            Request::Locate { .. } => "locate",
            Request::FindPath { .. } => "find_path",
            Request::ListLsps => "list_lsps",
            Request::Exec { .. } => "exec",
        }
    }

    /// Decoder that handles this request's response
    pub fn response_kind(&self) -> ResponseKind {
        match self {
            Request::ListFiles { .. } => ResponseKind::ListFiles,
            Request::Find { .. } => ResponseKind::Find,
            Request::Replace { .. } => ResponseKind::Replace,
            Request::Locate { .. } => ResponseKind::Locate,
            Request::FindPath { .. } => ResponseKind::FindPath,
            Request::ListLsps => ResponseKind::ListLsps,
            Request::Exec { .. } => ResponseKind::Exec,
        }
    }

    /// Single-line JSON terminated by `\n`
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Split a delimited filter string, dropping empty entries
pub fn tokenize_filters(filters: &str) -> Vec<String> {
    filters
        .split(FILTER_SEPARATORS)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join an argv into one command string, quoting arguments that contain spaces
pub fn join_command_line(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            let already_quoted = arg.len() >= 2 && arg.starts_with('"') && arg.ends_with('"');
            if arg.contains(' ') && !already_quoted {
                format!("\"{}\"", arg)
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_filters() {
        assert_eq!(
            tokenize_filters("*.cpp;*.h, *.hpp |*.c"),
            vec!["*.cpp", "*.h", "*.hpp", "*.c"]
        );
        assert!(tokenize_filters("").is_empty());
        assert!(tokenize_filters(" ;,| ").is_empty());
    }

    #[test]
    fn test_exec_wire_format() {
        let line = Request::exec("echo hi", "/home/dev", &[]).to_line().unwrap();
        assert_eq!(
            line,
            "{\"command\":\"exec\",\"wd\":\"/home/dev\",\"cmd\":\"echo hi\",\"env\":[]}\n"
        );
    }

    #[test]
    fn test_exec_env_order_preserved() {
        let env = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("CC".to_string(), "clang".to_string()),
        ];
        let value = serde_json::to_value(Request::exec("make", "/src", &env)).unwrap();
        assert_eq!(
            value["env"],
            serde_json::json!([
                {"name": "PATH", "value": "/usr/bin"},
                {"name": "CC", "value": "clang"}
            ])
        );
    }

    #[test]
    fn test_list_files_request() {
        let value = serde_json::to_value(Request::list_files(
            "/src",
            "*.cpp;*.h",
            "*.o",
            ".git build",
        ))
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "command": "ls",
                "root_dir": "/src",
                "file_extensions": ["*.cpp", "*.h"],
                "exclude_extensions": ["*.o"],
                "exclude_patterns": [".git", "build"]
            })
        );
    }

    #[test]
    fn test_find_and_replace_requests() {
        let search = SearchParams {
            root_dir: "/src".to_string(),
            extensions: "*.rs".to_string(),
            exclude_patterns: "target".to_string(),
            find_what: "foo".to_string(),
            whole_word: true,
            icase: false,
        };
        let find = serde_json::to_value(Request::find(&search)).unwrap();
        assert_eq!(find["command"], "find");
        assert_eq!(find["whole_word"], true);
        assert_eq!(find["icase"], false);
        assert_eq!(find["file_extensions"], serde_json::json!(["*.rs"]));

        let replace = serde_json::to_value(Request::replace(&ReplaceParams {
            search,
            replace_with: "bar".to_string(),
        }))
        .unwrap();
        assert_eq!(replace["command"], "replace");
        assert_eq!(replace["replace_with"], "bar");
        assert_eq!(replace["exclude_patterns"], serde_json::json!(["target"]));
    }

    #[test]
    fn test_simple_requests() {
        assert_eq!(
            Request::ListLsps.to_line().unwrap(),
            "{\"command\":\"list_lsps\"}\n"
        );
        assert_eq!(
            Request::find_path("/usr/include").to_line().unwrap(),
            "{\"command\":\"find_path\",\"path\":\"/usr/include\"}\n"
        );
        let locate = serde_json::to_value(Request::locate(
            "/usr/bin",
            "clangd",
            "",
            &["15".to_string(), "14".to_string()],
        ))
        .unwrap();
        assert_eq!(locate["versions"], serde_json::json!(["15", "14"]));
        assert_eq!(
            Request::ListLsps.response_kind(),
            ResponseKind::ListLsps
        );
    }

    #[test]
    fn test_join_command_line() {
        let args: Vec<String> = ["ls", "-l", "my dir", "\"quoted arg\""]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(join_command_line(&args), "ls -l \"my dir\" \"quoted arg\"");
        assert_eq!(join_command_line(&[]), "");
    }
}
