pub mod image;
pub mod postprocess;

/// Render a markdown body to HTML. Raw HTML (including the `<img>` fragments
/// produced by image migration) passes through untouched. Task list syntax is
/// left as literal text for [`postprocess::process`] to pick up.
pub fn render(src: &str) -> String {
    use pulldown_cmark::Options;
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = pulldown_cmark::Parser::new_ext(src, options);
    let mut html = String::with_capacity(src.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}
