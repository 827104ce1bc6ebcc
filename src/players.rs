//! Player, ban and command listings built from server responses and the
//! server's JSON state files.

use std::{collections::BTreeSet, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static TIMESTAMP_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\d{2}:\d{2}:\d{2}\]\s*").expect("valid timestamp regex"));
static LEVEL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[[^\]]*/(?:INFO|WARN|ERROR|DEBUG|FATAL|TRACE)\]:\s*").expect("valid level regex")
});
static PLAYER_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"There are (\d+)\s*(?:/|of a max(?: of)?)\s*(\d+) players online:?(.*)")
        .expect("valid player count regex")
});
static HELP_PAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Showing help page (\d+) of (\d+)").expect("valid help page regex")
});
static COMMAND_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s()\]>-])/([A-Za-z][A-Za-z0-9_-]*)").expect("valid command regex")
});

/// Entry of `ops.json`, `whitelist.json` or `banned-players.json`. Fields
/// beyond uuid and name are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntry {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of `banned-ips.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpBanEntry {
    pub ip: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of `usercache.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedUser {
    pub name: String,
    pub uuid: String,
    #[serde(default)]
    pub expires_on: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub key: String,
    pub name: String,
    pub online: bool,
    pub banned: bool,
    pub opped: bool,
    pub whitelisted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayerInfo {
    pub summary: String,
    pub players: Vec<Player>,
}

/// Lists the player state is cross-referenced against.
#[derive(Debug, Clone, Copy)]
pub struct PlayerLists<'a> {
    pub user_cache: &'a [CachedUser],
    pub ops: &'a [PlayerEntry],
    pub banned_players: &'a [PlayerEntry],
    pub whitelist: &'a [PlayerEntry],
}

/// Result of a `list` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineList {
    pub summary: String,
    pub names: Vec<String>,
}

/// Strips the `[HH:MM:SS]` and `[thread/LEVEL]:` prefixes from a console line.
pub fn clean_console_line(line: &str) -> String {
    let line = TIMESTAMP_PREFIX.replace(line, "");
    LEVEL_PREFIX.replace(&line, "").trim().to_string()
}

pub fn clean_console_output(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| clean_console_line(l))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Accepts both `There are 1 of a max of 20 players online: a` and the older
/// two-line `There are 1/20 players online:` followed by the names.
pub fn parse_online_list(text: &str) -> OnlineList {
    let mut lines = text.lines().map(clean_console_line);

    while let Some(line) = lines.next() {
        let Some(caps) = PLAYER_COUNT.captures(&line) else {
            continue;
        };
        let count = caps.get(1).map_or("0", |m| m.as_str());
        let mut names_text = caps.get(3).map_or("", |m| m.as_str()).trim().to_string();
        if names_text.is_empty() && count != "0" {
            names_text = lines.next().unwrap_or_default();
        }
        let names = names_text
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        return OnlineList {
            summary: format!("{count} players online"),
            names,
        };
    }

    OnlineList {
        summary: text.trim().to_string(),
        names: Vec::new(),
    }
}

fn matches_entry(entries: &[PlayerEntry], uuid: &str, name: &str) -> bool {
    entries.iter().any(|e| {
        (!uuid.is_empty() && e.uuid.eq_ignore_ascii_case(uuid)) || e.name.eq_ignore_ascii_case(name)
    })
}

/// Online players first (in listing order), then cached users who are
/// offline, sorted by name.
pub fn build_players(online: &[String], lists: PlayerLists<'_>) -> Vec<Player> {
    let make = |key: String, name: &str, uuid: &str, is_online: bool| Player {
        key,
        name: name.to_string(),
        online: is_online,
        banned: matches_entry(lists.banned_players, uuid, name),
        opped: matches_entry(lists.ops, uuid, name),
        whitelisted: matches_entry(lists.whitelist, uuid, name),
    };

    let mut players: Vec<Player> = online
        .iter()
        .map(|name| {
            let cached = lists
                .user_cache
                .iter()
                .find(|u| u.name.eq_ignore_ascii_case(name));
            match cached {
                Some(user) => make(user.uuid.clone(), name, &user.uuid, true),
                None => make(name.to_lowercase(), name, "", true),
            }
        })
        .collect();

    let mut offline: Vec<Player> = lists
        .user_cache
        .iter()
        .filter(|u| !online.iter().any(|n| n.eq_ignore_ascii_case(&u.name)))
        .map(|u| make(u.uuid.clone(), &u.name, &u.uuid, false))
        .collect();
    offline.sort_by_key(|p| p.name.to_lowercase());

    players.extend(offline);
    players
}

/// `(current, total)` from a paged help banner.
pub fn help_page_count(text: &str) -> Option<(u32, u32)> {
    let caps = HELP_PAGE.captures(text)?;
    let current = caps.get(1)?.as_str().parse().ok()?;
    let total = caps.get(2)?.as_str().parse().ok()?;
    Some((current, total))
}

/// Command names from help output, sorted and unique. Alternate forms
/// (`/tp <target> OR /tp <x> <y> <z>`) are skipped.
pub fn parse_help(text: &str) -> Vec<String> {
    let mut commands = BTreeSet::new();
    for line in text.lines() {
        let line = clean_console_line(line);

        // RCON bodies join every help line into one, so entries are cut at
        // each `/command` token. `/a ... OR /a ...` stays one entry.
        let mut entries: Vec<(usize, &str)> = Vec::new();
        for caps in COMMAND_TOKEN.captures_iter(&line) {
            let Some(cmd) = caps.get(1) else { continue };
            let slash = cmd.start() - 1;
            if line[..slash].trim_end().ends_with(" OR") {
                continue;
            }
            entries.push((slash, cmd.as_str()));
        }

        for (i, &(start, cmd)) in entries.iter().enumerate() {
            let end = entries.get(i + 1).map_or(line.len(), |&(next, _)| next);
            if !line[start..end].contains(" OR ") {
                commands.insert(cmd.to_string());
            }
        }
    }
    commands.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(uuid: &str, name: &str) -> PlayerEntry {
        PlayerEntry {
            uuid: uuid.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }

    #[test]
    fn console_prefixes_are_stripped() {
        assert_eq!(
            clean_console_line("[12:01:02] [Server thread/INFO]: There are 0 of a max of 20 players online: "),
            "There are 0 of a max of 20 players online:"
        );
        assert_eq!(clean_console_line("plain"), "plain");
        let lines = vec![
            "[12:01:02] [Server thread/INFO]: a".to_string(),
            "[12:01:02] [Server thread/INFO]: ".to_string(),
            "[12:01:02] [Server thread/WARN]: b".to_string(),
        ];
        assert_eq!(clean_console_output(&lines), "a\nb");
    }

    #[test]
    fn modern_list_format() {
        let list = parse_online_list("There are 2 of a max of 20 players online: Steve, Alex");
        assert_eq!(list.summary, "2 players online");
        assert_eq!(list.names, vec!["Steve", "Alex"]);

        let empty = parse_online_list("There are 0 of a max of 20 players online: ");
        assert_eq!(empty.summary, "0 players online");
        assert!(empty.names.is_empty());
    }

    #[test]
    fn legacy_two_line_list_format() {
        let list = parse_online_list(
            "[12:00:00] [Server thread/INFO]: There are 1/20 players online:\n[12:00:00] [Server thread/INFO]: Notch",
        );
        assert_eq!(list.summary, "1 players online");
        assert_eq!(list.names, vec!["Notch"]);
    }

    #[test]
    fn players_cross_reference_lists() {
        let cache = vec![
            CachedUser {
                name: "Steve".into(),
                uuid: "u-steve".into(),
                expires_on: String::new(),
            },
            CachedUser {
                name: "alex".into(),
                uuid: "u-alex".into(),
                expires_on: String::new(),
            },
            CachedUser {
                name: "Bob".into(),
                uuid: "u-bob".into(),
                expires_on: String::new(),
            },
        ];
        let ops = vec![entry("u-steve", "Steve")];
        let banned = vec![entry("u-bob", "Bob")];
        let whitelist = vec![entry("", "Alex")];
        let lists = PlayerLists {
            user_cache: &cache,
            ops: &ops,
            banned_players: &banned,
            whitelist: &whitelist,
        };

        let players = build_players(&["Steve".into(), "Herobrine".into()], lists);
        let keys: Vec<_> = players.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["u-steve", "herobrine", "u-alex", "u-bob"]);

        assert!(players[0].online && players[0].opped && !players[0].banned);
        assert!(players[1].online && !players[1].opped);
        assert!(!players[2].online && players[2].whitelisted);
        assert!(!players[3].online && players[3].banned);
    }

    #[test]
    fn no_one_online_lists_cached_users_offline() {
        let cache = vec![CachedUser {
            name: "Steve".into(),
            uuid: "u-steve".into(),
            expires_on: String::new(),
        }];
        let lists = PlayerLists {
            user_cache: &cache,
            ops: &[],
            banned_players: &[],
            whitelist: &[],
        };
        let players = build_players(&[], lists);
        assert_eq!(players.len(), 1);
        assert!(!players[0].online);
    }

    #[test]
    fn help_parsing_skips_alternate_forms() {
        let text = "--- Showing help page 1 of 3 (/help <page>) ---\n\
            /achievement <give|take> <name|*> [player]\n\
            /ban <name> [reason ...]\n\
            /tp [target player] <destination player> OR /tp [target player] <x> <y> <z>\n\
            /ban-ip <address|name> [reason ...]";
        assert_eq!(help_page_count(text), Some((1, 3)));
        assert_eq!(parse_help(text), vec!["achievement", "ban", "ban-ip", "help"]);
        assert_eq!(help_page_count("/list"), None);
    }

    #[test]
    fn help_parsing_handles_joined_rcon_output() {
        let text = "/advancement (grant|revoke)/attribute <target> <attribute>/ban <targets> [<reason>]";
        assert_eq!(parse_help(text), vec!["advancement", "attribute", "ban"]);
    }

    #[test]
    fn joined_legacy_help_only_loses_the_alternate_form() {
        let text = "--- Showing help page 1 of 9 (/help <page>) ---/achievement <give|take> <name|*> [player]\
            /ban <name> [reason ...]/tp [target player] <destination player> OR /tp [target player] <x> <y> <z>\
            /whitelist <on|off|list|add|remove|reload>";
        assert_eq!(help_page_count(text), Some((1, 9)));
        assert_eq!(parse_help(text), vec!["achievement", "ban", "help", "whitelist"]);
    }

    #[test]
    fn entries_keep_extra_fields() {
        let json = r#"[{"uuid":"u1","name":"Steve","level":4,"bypassesPlayerLimit":false}]"#;
        let ops: Vec<PlayerEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(ops[0].name, "Steve");
        assert_eq!(ops[0].extra.get("level"), Some(&Value::from(4)));
    }
}
