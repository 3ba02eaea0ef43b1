//! Static artifact set used when no provider produces usable code.

use shipwright_adapters::ArtifactFile;

const PACKAGE_JSON: &str = r#"{
  "name": "shipwright-app",
  "private": true,
  "scripts": {
    "dev": "next dev",
    "build": "next build",
    "start": "next start"
  },
  "dependencies": {
    "next": "^14.2.0",
    "react": "^18.3.0",
    "react-dom": "^18.3.0"
  }
}
"#;

const LAYOUT_TSX: &str = r#"export const metadata = { title: "Shipwright app" };

export default function RootLayout({ children }: { children: React.ReactNode }) {
  return (
    <html lang="en">
      <body>{children}</body>
    </html>
  );
}
"#;

/// First non-empty line of the requirements, without markdown heading marks.
pub(crate) fn headline(requirements: &str) -> String {
    requirements
        .lines()
        .map(|l| l.trim().trim_start_matches('#').trim())
        .find(|l| !l.is_empty())
        .unwrap_or("Generated application")
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '{' | '}' | '`'))
        .take(80)
        .collect()
}

/// The fixed, non-generated files substituted for model output.
#[must_use]
pub fn fallback_artifacts(requirements: &str) -> Vec<ArtifactFile> {
    let title = headline(requirements);
    let page = format!(
        r#"export default function Home() {{
  return (
    <main>
      <h1>{title}</h1>
      <p>This placeholder was committed because code generation was unavailable.</p>
    </main>
  );
}}
"#
    );
    let readme = format!(
        "# {title}\n\nPlaceholder application. Code generation was unavailable for this run;\n\
         re-run the code-generation stage to replace these files.\n"
    );

    vec![
        ArtifactFile::new("package.json", PACKAGE_JSON),
        ArtifactFile::new("app/layout.tsx", LAYOUT_TSX),
        ArtifactFile::new("app/page.tsx", page),
        ArtifactFile::new("README.md", readme),
    ]
}
