use std::collections::HashSet;
use std::io::Write as _;
use std::sync::Arc;

use titulky_core::{
    ArchiveExtractor, ArchiveKind, CaptchaChallenge, CaptchaSolver, MemoryCache,
    SubtitleLanguage, TitulkyConfig, TitulkyProvider, Video,
};

struct StdinSolver;

#[async_trait::async_trait]
impl CaptchaSolver for StdinSolver {
    async fn solve(&self, challenge: CaptchaChallenge) -> titulky_core::Result<String> {
        std::fs::write("captcha.png", &challenge.image).ok();
        print!("CAPTCHA uložena do captcha.png, opište kód: ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok();
        Ok(line)
    }
}

struct RawExtractor;

impl ArchiveExtractor for RawExtractor {
    fn extract_subtitle(&self, kind: ArchiveKind, data: &[u8]) -> titulky_core::Result<Vec<u8>> {
        println!("⚠️  Stažený soubor je {kind} archiv, ukládám ho nerozbalený");
        Ok(data.to_vec())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let username = std::env::var("TITULKY_USERNAME")?;
    let password = std::env::var("TITULKY_PASSWORD")?;

    let config = TitulkyConfig {
        username,
        password,
        approved_only: false,
        skip_wrong_fps: true,
    };
    let mut provider = TitulkyProvider::new(
        config,
        Arc::new(MemoryCache::new()),
        Arc::new(StdinSolver),
        Arc::new(RawExtractor),
    )?;

    println!("🔑 Přihlašuji se na Titulky.com...");
    provider.initialize().await?;

    // Teorie velkého třesku S01E03
    let video = Video::Episode {
        series_imdb_id: Some("tt0898266".to_string()),
        season: 1,
        episode: 3,
    };
    let languages = HashSet::from([SubtitleLanguage::Czech, SubtitleLanguage::Slovak]);

    println!("🔍 Hledám titulky...\n");
    let subtitles = provider.list_subtitles(&video, &languages).await?;

    println!("Nalezeno {} titulků:", subtitles.len());
    for (i, sub) in subtitles.iter().enumerate() {
        let fps = sub
            .fps
            .map(|f| format!("{f} fps"))
            .unwrap_or_else(|| "—".to_string());
        let approved = if sub.approved { "schválené" } else { "neschválené" };
        println!(
            "  {}. [{}] {} (od {}, {}, {})",
            i + 1,
            sub.language,
            sub.release_info,
            sub.uploader,
            fps,
            approved
        );
    }

    if let Some(first) = subtitles.first() {
        println!("\n⬇️  Stahuji: {} (id {})", first.release_info, first.sub_id);
        let mut record = first.clone();
        provider.download_subtitle(&mut record).await?;
        match record.content {
            Some(content) => {
                std::fs::write("titulky.srt", &content)?;
                println!("Uloženo {} bajtů do titulky.srt", content.len());
            }
            None => println!("Stažení se nepovedlo."),
        }
    }

    provider.logout().await?;
    provider.terminate();

    Ok(())
}
