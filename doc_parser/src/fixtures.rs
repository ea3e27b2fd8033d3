//! In-memory `.pptx` / `.docx` builders for tests.
//!
//! The generated packages carry only the parts the extractors read, which is
//! enough for Office-like structure without shipping binary fixtures.

use util::test_helpers::build_zip_str;

pub const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
pub const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const NS_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
pub const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_PKG_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/></Types>"#;

fn rels(entries: &[(String, String, String, bool)]) -> String {
    let body: String = entries
        .iter()
        .map(|(id, ty, target, external)| {
            let mode = if *external { r#" TargetMode="External""# } else { "" };
            format!(r#"<Relationship Id="{id}" Type="{ty}" Target="{target}"{mode}/>"#)
        })
        .collect();
    format!(r#"<Relationships xmlns="{NS_PKG_RELS}">{body}</Relationships>"#)
}

fn rel(id: &str, ty: &str, target: &str) -> (String, String, String, bool) {
    (id.to_string(), format!("{REL}/{ty}"), target.to_string(), false)
}

fn root_rels(main: &str) -> String {
    rels(&[
        rel("rId1", "officeDocument", main),
        (
            "rId2".into(),
            "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties".into(),
            "docProps/core.xml".into(),
            false,
        ),
        rel("rId3", "extended-properties", "docProps/app.xml"),
    ])
}

fn core_props(title: &str) -> String {
    format!(
        r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{title}</dc:title><dc:creator>Fixture</dc:creator></cp:coreProperties>"#
    )
}

fn app_props(application: &str) -> String {
    format!(
        r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Application>{application}</Application></Properties>"#
    )
}

fn zip_owned(files: &[(String, String)]) -> Vec<u8> {
    let refs: Vec<(&str, &str)> = files.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
    build_zip_str(&refs)
}

// ─── Presentation ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SlideSpec {
    title: String,
    transition: Option<String>,
    animated: bool,
    notes: Option<String>,
    hyperlink: Option<String>,
    pictures: usize,
    charts: usize,
    layout: bool,
}

impl SlideSpec {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            transition: None,
            animated: false,
            notes: None,
            hyperlink: None,
            pictures: 0,
            charts: 0,
            layout: true,
        }
    }

    pub fn transition(mut self, effect: &str) -> Self {
        self.transition = Some(effect.to_string());
        self
    }

    /// `<p:transition/>` with no effect element.
    pub fn bare_transition(mut self) -> Self {
        self.transition = Some(String::new());
        self
    }

    pub fn animated(mut self) -> Self {
        self.animated = true;
        self
    }

    pub fn notes(mut self, text: &str) -> Self {
        self.notes = Some(text.to_string());
        self
    }

    pub fn hyperlink(mut self, url: &str) -> Self {
        self.hyperlink = Some(url.to_string());
        self
    }

    pub fn picture(mut self) -> Self {
        self.pictures += 1;
        self
    }

    pub fn chart(mut self) -> Self {
        self.charts += 1;
        self
    }

    pub fn missing_layout(mut self) -> Self {
        self.layout = false;
        self
    }

    fn xml(&self) -> String {
        let mut tree = format!(
            r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>"#,
            self.title
        );
        if self.hyperlink.is_some() {
            tree.push_str(r#"<p:sp><p:nvSpPr><p:cNvPr id="3" name="Link"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:rPr><a:hlinkClick r:id="rId10"/></a:rPr><a:t>more info</a:t></a:r></a:p></p:txBody></p:sp>"#);
        }
        for i in 0..self.pictures {
            tree.push_str(&format!(
                r#"<p:pic><p:nvPicPr><p:cNvPr id="{}" name="Picture"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr></p:pic>"#,
                10 + i
            ));
        }
        for _ in 0..self.charts {
            tree.push_str(r#"<p:graphicFrame><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/chart"/></a:graphic></p:graphicFrame>"#);
        }

        let transition = match self.transition.as_deref() {
            None => String::new(),
            Some("") => "<p:transition/>".to_string(),
            Some(effect) => format!(r#"<p:transition spd="med"><p:{effect}/></p:transition>"#),
        };
        let timing = if self.animated {
            r#"<p:timing><p:tnLst><p:par><p:cTn id="1" dur="indefinite" nodeType="tmRoot"/></p:par></p:tnLst></p:timing>"#
        } else {
            ""
        };

        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:cSld><p:spTree><p:nvGrpSpPr/><p:grpSpPr/>{tree}</p:spTree></p:cSld>{transition}{timing}</p:sld>"#
        )
    }
}

#[derive(Debug, Clone)]
pub struct PptxBuilder {
    slides: Vec<SlideSpec>,
    order: Option<Vec<usize>>,
    theme: Option<(String, String, String)>,
}

impl Default for PptxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PptxBuilder {
    pub fn new() -> Self {
        Self {
            slides: Vec::new(),
            order: None,
            theme: Some(("Office Theme".into(), "Office".into(), "Calibri Light".into())),
        }
    }

    pub fn slide(mut self, slide: SlideSpec) -> Self {
        self.slides.push(slide);
        self
    }

    /// Authored order as 1-based slide part numbers.
    pub fn order(mut self, order: &[usize]) -> Self {
        self.order = Some(order.to_vec());
        self
    }

    pub fn theme(mut self, name: &str, scheme: &str, major_font: &str) -> Self {
        self.theme = Some((name.into(), scheme.into(), major_font.into()));
        self
    }

    pub fn without_theme(mut self) -> Self {
        self.theme = None;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let n = self.slides.len();
        let order = self.order.clone().unwrap_or_else(|| (1..=n).collect());

        let ids: String = order
            .iter()
            .enumerate()
            .map(|(pos, part)| format!(r#"<p:sldId id="{}" r:id="rId{part}"/>"#, 256 + pos))
            .collect();
        let presentation = format!(
            r#"<p:presentation xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:sldIdLst>{ids}</p:sldIdLst></p:presentation>"#
        );

        let mut pres_rels: Vec<_> = (1..=n)
            .map(|i| rel(&format!("rId{i}"), "slide", &format!("slides/slide{i}.xml")))
            .collect();
        if self.theme.is_some() {
            pres_rels.push(rel("rId100", "theme", "theme/theme1.xml"));
        }

        let mut files = vec![
            ("[Content_Types].xml".to_string(), CONTENT_TYPES.to_string()),
            ("_rels/.rels".into(), root_rels("ppt/presentation.xml")),
            ("docProps/core.xml".into(), core_props("Fixture deck")),
            ("docProps/app.xml".into(), app_props("Microsoft Office PowerPoint")),
            ("ppt/presentation.xml".into(), presentation),
            ("ppt/_rels/presentation.xml.rels".into(), rels(&pres_rels)),
            (
                "ppt/slideLayouts/slideLayout1.xml".into(),
                format!(r#"<p:sldLayout xmlns:p="{NS_P}" type="title"><p:cSld name="Title Slide"/></p:sldLayout>"#),
            ),
        ];

        if let Some((name, scheme, major)) = &self.theme {
            let accents: String = ["4472C4", "ED7D31", "A5A5A5", "FFC000", "5B9BD5", "70AD47"]
                .iter()
                .enumerate()
                .map(|(i, c)| format!(r#"<a:accent{n}><a:srgbClr val="{c}"/></a:accent{n}>"#, n = i + 1))
                .collect();
            files.push((
                "ppt/theme/theme1.xml".into(),
                format!(
                    r#"<a:theme xmlns:a="{NS_A}" name="{name}"><a:themeElements><a:clrScheme name="{scheme}"><a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1>{accents}</a:clrScheme><a:fontScheme name="{scheme}"><a:majorFont><a:latin typeface="{major}"/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/></a:minorFont></a:fontScheme></a:themeElements></a:theme>"#
                ),
            ));
        }

        for (i, slide) in self.slides.iter().enumerate() {
            let num = i + 1;
            let mut slide_rels = Vec::new();
            if slide.layout {
                slide_rels.push(rel("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml"));
            }
            if let Some(url) = &slide.hyperlink {
                slide_rels.push(("rId10".into(), format!("{REL}/hyperlink"), url.clone(), true));
            }
            if let Some(notes) = &slide.notes {
                slide_rels.push(rel("rId2", "notesSlide", &format!("../notesSlides/notesSlide{num}.xml")));
                files.push((
                    format!("ppt/notesSlides/notesSlide{num}.xml"),
                    format!(
                        r#"<p:notes xmlns:a="{NS_A}" xmlns:p="{NS_P}"><p:cSld><p:spTree><p:sp><p:nvSpPr><p:nvPr><p:ph type="sldNum"/></p:nvPr></p:nvSpPr><p:txBody><a:p><a:fld><a:t>{num}</a:t></a:fld></a:p></p:txBody></p:sp><p:sp><p:nvSpPr><p:nvPr><p:ph type="body" idx="1"/></p:nvPr></p:nvSpPr><p:txBody><a:p><a:r><a:t>{notes}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:notes>"#
                    ),
                ));
            }
            files.push((format!("ppt/slides/slide{num}.xml"), slide.xml()));
            files.push((format!("ppt/slides/_rels/slide{num}.xml.rels"), rels(&slide_rels)));
        }

        zip_owned(&files)
    }
}

// ─── Word-processor ─────────────────────────────────────────────────

const STYLES: &str = r#"<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:style w:type="paragraph" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:pPr><w:outlineLvl w:val="0"/></w:pPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/><w:basedOn w:val="Normal"/><w:pPr><w:outlineLvl w:val="1"/></w:pPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading3"><w:name w:val="heading 3"/><w:basedOn w:val="Normal"/><w:pPr><w:outlineLvl w:val="2"/></w:pPr></w:style>
<w:style w:type="paragraph" w:styleId="Titre1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/></w:style>
<w:style w:type="paragraph" w:styleId="ChapterHeading"><w:name w:val="Chapter Heading"/><w:basedOn w:val="Heading1"/></w:style>
<w:style w:type="paragraph" w:styleId="TOC1"><w:name w:val="toc 1"/></w:style>
<w:style w:type="paragraph" w:styleId="TOC2"><w:name w:val="toc 2"/></w:style>
</w:styles>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HfVariant {
    Default,
    First,
    Even,
}

impl HfVariant {
    fn as_str(&self) -> &'static str {
        match self {
            HfVariant::Default => "default",
            HfVariant::First => "first",
            HfVariant::Even => "even",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocxBuilder {
    body: Vec<String>,
    headers: Vec<HfVariant>,
    footers: Vec<(HfVariant, bool)>,
    dangling_header: bool,
    title_page: bool,
    even_and_odd: bool,
    title: Option<String>,
}

fn run(text: &str) -> String {
    format!(r#"<w:r><w:t xml:space="preserve">{text}</w:t></w:r>"#)
}

fn styled_paragraph(style: &str, text: &str) -> String {
    format!(r#"<w:p><w:pPr><w:pStyle w:val="{style}"/></w:pPr>{}</w:p>"#, run(text))
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paragraph(mut self, text: &str) -> Self {
        self.body.push(format!("<w:p>{}</w:p>", run(text)));
        self
    }

    pub fn heading(self, level: u8, text: &str) -> Self {
        self.styled(&format!("Heading{level}"), text)
    }

    pub fn styled(mut self, style_id: &str, text: &str) -> Self {
        self.body.push(styled_paragraph(style_id, text));
        self
    }

    /// Paragraph with a direct `w:outlineLvl` and no heading style.
    pub fn outline_paragraph(mut self, outline_level: u8, text: &str) -> Self {
        self.body.push(format!(
            r#"<w:p><w:pPr><w:outlineLvl w:val="{outline_level}"/></w:pPr>{}</w:p>"#,
            run(text)
        ));
        self
    }

    /// A literal TOC field whose cached result lists `entries` as (level, text).
    pub fn toc_field(mut self, entries: &[(u8, &str)]) -> Self {
        let mut paras = Vec::new();
        for (i, (level, text)) in entries.iter().enumerate() {
            let begin = if i == 0 {
                r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText xml:space="preserve"> TOC \o "1-3" \h \z \u </w:instrText></w:r><w:r><w:fldChar w:fldCharType="separate"/></w:r>"#
            } else {
                ""
            };
            paras.push(format!(
                r#"<w:p><w:pPr><w:pStyle w:val="TOC{level}"/></w:pPr>{begin}{}</w:p>"#,
                run(text)
            ));
        }
        paras.push(r#"<w:p><w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#.to_string());
        self.body.push(paras.concat());
        self
    }

    /// A TOC content control without any field code.
    pub fn toc_content_control(mut self) -> Self {
        self.body.push(format!(
            r#"<w:sdt><w:sdtPr><w:docPartObj><w:docPartGallery w:val="Table of Contents"/><w:docPartUnique/></w:docPartObj></w:sdtPr><w:sdtContent>{}</w:sdtContent></w:sdt>"#,
            styled_paragraph("TOC1", "Contents placeholder")
        ));
        self
    }

    pub fn table(mut self, rows: usize, columns: usize) -> Self {
        self.body.push(table_xml(rows, columns, None));
        self
    }

    /// A 1x1 table holding a 2x2 table in its cell.
    pub fn nested_table(mut self) -> Self {
        self.body.push(table_xml(1, 1, Some(table_xml(2, 2, None))));
        self
    }

    pub fn image(mut self) -> Self {
        self.body.push(format!(
            r#"<w:p><w:r><w:drawing><wp:inline><a:graphic><a:graphicData uri="{NS_PIC}"><pic:pic/></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
        ));
        self
    }

    pub fn header(mut self, variant: HfVariant) -> Self {
        self.headers.push(variant);
        self
    }

    pub fn footer(mut self, variant: HfVariant, page_numbers: bool) -> Self {
        self.footers.push((variant, page_numbers));
        self
    }

    /// A header reference whose target part is absent from the package.
    pub fn dangling_header(mut self) -> Self {
        self.dangling_header = true;
        self
    }

    pub fn title_page(mut self) -> Self {
        self.title_page = true;
        self
    }

    pub fn even_and_odd(mut self) -> Self {
        self.even_and_odd = true;
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut doc_rels = vec![
            rel("rIdStyles", "styles", "styles.xml"),
            rel("rIdSettings", "settings", "settings.xml"),
        ];
        let mut files: Vec<(String, String)> = Vec::new();
        let mut refs = String::new();

        for (i, variant) in self.headers.iter().enumerate() {
            let id = format!("rIdH{i}");
            let part = format!("header{}.xml", i + 1);
            refs.push_str(&format!(
                r#"<w:headerReference w:type="{}" r:id="{id}"/>"#,
                variant.as_str()
            ));
            doc_rels.push(rel(&id, "header", &part));
            files.push((
                format!("word/{part}"),
                format!(r#"<w:hdr xmlns:w="{NS_W}"><w:p>{}</w:p></w:hdr>"#, run("Header text")),
            ));
        }
        for (i, (variant, pages)) in self.footers.iter().enumerate() {
            let id = format!("rIdF{i}");
            let part = format!("footer{}.xml", i + 1);
            refs.push_str(&format!(
                r#"<w:footerReference w:type="{}" r:id="{id}"/>"#,
                variant.as_str()
            ));
            doc_rels.push(rel(&id, "footer", &part));
            let content = if *pages {
                r#"<w:fldSimple w:instr=" PAGE   \* MERGEFORMAT "><w:r><w:t>1</w:t></w:r></w:fldSimple>"#.to_string()
            } else {
                run("Footer text")
            };
            files.push((
                format!("word/{part}"),
                format!(r#"<w:ftr xmlns:w="{NS_W}"><w:p>{content}</w:p></w:ftr>"#),
            ));
        }
        if self.dangling_header {
            refs.push_str(r#"<w:headerReference w:type="first" r:id="rIdGone"/>"#);
            doc_rels.push(rel("rIdGone", "header", "header99.xml"));
        }
        if self.title_page {
            refs.push_str("<w:titlePg/>");
        }

        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{NS_W}" xmlns:r="{NS_R}" xmlns:wp="{NS_WP}" xmlns:a="{NS_A}" xmlns:pic="{NS_PIC}"><w:body>{}<w:sectPr>{refs}<w:pgSz w:w="11906" w:h="16838"/></w:sectPr></w:body></w:document>"#,
            self.body.concat()
        );
        let settings = if self.even_and_odd {
            format!(r#"<w:settings xmlns:w="{NS_W}"><w:evenAndOddHeaders/></w:settings>"#)
        } else {
            format!(r#"<w:settings xmlns:w="{NS_W}"/>"#)
        };

        files.extend([
            ("[Content_Types].xml".to_string(), CONTENT_TYPES.to_string()),
            ("_rels/.rels".into(), root_rels("word/document.xml")),
            (
                "docProps/core.xml".into(),
                core_props(self.title.as_deref().unwrap_or("")),
            ),
            ("docProps/app.xml".into(), app_props("Microsoft Office Word")),
            ("word/document.xml".into(), document),
            ("word/_rels/document.xml.rels".into(), rels(&doc_rels)),
            ("word/styles.xml".into(), STYLES.to_string()),
            ("word/settings.xml".into(), settings),
        ]);

        zip_owned(&files)
    }
}

fn table_xml(rows: usize, columns: usize, nested: Option<String>) -> String {
    let cell = match &nested {
        Some(inner) => format!("<w:tc>{inner}<w:p/></w:tc>"),
        None => format!("<w:tc><w:p>{}</w:p></w:tc>", run("cell")),
    };
    let row = format!("<w:tr>{}</w:tr>", cell.repeat(columns));
    format!(
        r#"<w:tbl><w:tblPr/><w:tblGrid>{}</w:tblGrid>{}</w:tbl>"#,
        r#"<w:gridCol w:w="2000"/>"#.repeat(columns),
        row.repeat(rows)
    )
}
