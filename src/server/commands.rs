use tracing::{debug, warn};

use crate::{
    error::{RconError, Result, ServerError},
    players::{
        PlayerInfo, PlayerLists, build_players, clean_console_output, help_page_count, parse_help,
        parse_online_list,
    },
    rcon::{RconClient, RconSettings},
};

use super::domain::MinecraftServer;

const MAX_HELP_PAGES: u32 = 64;

impl MinecraftServer {
    /// Runs one command on the started server and returns its output, over
    /// RCON when the process was started with it and over the console
    /// otherwise.
    pub async fn run_command(&mut self, command: &str) -> Result<String> {
        if !self.properties.state.is_started() {
            return Err(ServerError::NotRunning);
        }

        if self.properties.rcon_configured {
            self.rcon_command(command).await
        } else {
            self.console_command(command).await
        }
    }

    async fn rcon_client(&mut self) -> Result<&mut RconClient> {
        if self.rcon.is_none() {
            let settings = RconSettings::from_properties(&self.properties.server_properties)
                .ok_or(RconError::NotConfigured)?;
            let mut client = RconClient::connect(&settings.address).await?;
            client.login(&settings.password).await?;
            debug!(address = %settings.address, "RCON session opened");
            self.rcon = Some(client);
        }
        self.rcon
            .as_mut()
            .ok_or_else(|| RconError::NotConfigured.into())
    }

    pub(super) async fn rcon_command(&mut self, command: &str) -> Result<String> {
        let client = self.rcon_client().await?;
        match client.command(command).await {
            Ok(response) => Ok(response.body),
            Err(err) => {
                warn!(command, "RCON command failed: {err}");
                self.rcon = None;
                Err(err.into())
            }
        }
    }

    async fn console_command(&mut self, command: &str) -> Result<String> {
        let process = self.process.as_ref().ok_or(ServerError::NotRunning)?;
        let capture = self.output.attach()?;

        process.send_command(command).await?;
        if let Err(err) = capture
            .wait_for_output(self.timings.quiescence_interval, self.timings.quiescence_rounds)
            .await
        {
            debug!(command, "console output still growing: {err}");
        }

        Ok(clean_console_output(&capture.lines()))
    }

    /// Online players from `list`, joined with the cached, op, ban and
    /// whitelist state.
    pub async fn list_players(&mut self) -> Result<PlayerInfo> {
        let text = self.run_command("list").await?;
        let online = parse_online_list(&text);

        let lists = PlayerLists {
            user_cache: &self.properties.user_cache,
            ops: &self.properties.ops,
            banned_players: &self.properties.banned_players,
            whitelist: &self.properties.whitelist,
        };
        let players = build_players(&online.names, lists);

        self.properties.player_info = PlayerInfo {
            summary: online.summary,
            players,
        };
        Ok(self.properties.player_info.clone())
    }

    /// Requests every help page the server announces and stores the parsed
    /// command names.
    pub async fn list_commands(&mut self) -> Result<Vec<String>> {
        let first = self.run_command("help").await?;
        let total = help_page_count(&first).map_or(1, |(_, total)| total.min(MAX_HELP_PAGES));

        let mut pages = vec![first];
        for page in 2..=total {
            pages.push(self.run_command(&format!("help {page}")).await?);
        }

        let full_help = pages.join("\n");
        self.properties.allowed_commands = parse_help(&full_help);
        self.properties.full_help = full_help;
        debug!(count = self.properties.allowed_commands.len(), "commands listed");

        Ok(self.properties.allowed_commands.clone())
    }
}
